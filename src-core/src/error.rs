use derive_more::{Display, From};

use crate::clients::ErrorCategory;

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    Api(crate::clients::ApiError),

    #[from]
    Job(crate::jobs::JobError),

    #[from]
    Config(crate::config::ConfigError),

    #[from]
    Keychain(crate::keychain::KeychainError),

    #[from]
    #[display("Failed to create HTTP client: {_0}")]
    Http(reqwest::Error),
}

impl std::error::Error for Error {}

impl Error {
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::Api(e) => Some(e.category()),
            Error::Job(e) => Some(e.category()),
            Error::Config(_) | Error::Keychain(_) | Error::Http(_) => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::Api(e) => e.user_message(),
            Error::Job(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
