mod client;
mod error;
mod http_client;
mod request;
mod responses;

// Re-export public types
pub use client::ServiceApi;
pub use error::{classify, error_message, error_messages, ApiError, ErrorCategory};
pub use http_client::HttpServiceClient;
pub use request::{Credentials, Credits, JobKind, JobRequest, OutputFormat};
pub use responses::{
    CatalogResponse, JobStatus, RemoteStatus, SubmitOutcome, SubmitResponse, DEFAULT_PROVIDER_ID,
};
