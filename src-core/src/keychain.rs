use keyring::credential::{CredentialBuilder, CredentialBuilderApi, CredentialPersistence};
use keyring::Entry;
use log::{debug, error, info, warn};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::clients::Credentials;

const SERVICE: &str = "app.scribeline";

/// Keychain accounts used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum KeychainAccount {
    #[strum(serialize = "account_credentials")]
    Credentials,
    #[strum(serialize = "session_token")]
    SessionToken,
}

#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Keychain entry is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("No persistent keychain is available on this platform")]
    Unavailable,
}

/// Open the entry for `account` in the platform's default store
pub fn entry(account: KeychainAccount) -> Result<Entry, KeychainError> {
    Ok(Entry::new(SERVICE, &account.to_string())?)
}

/// Open the entry for `account` in the store made by `builder`
pub fn entry_in(builder: &CredentialBuilder, account: KeychainAccount) -> Result<Entry, KeychainError> {
    let credential = builder.build(None, SERVICE, &account.to_string())?;
    Ok(Entry::new_with_credential(credential))
}

/// Whether entries written through `builder` outlive the current process
pub fn outlives_process(builder: &CredentialBuilder) -> bool {
    matches!(
        builder.persistence(),
        CredentialPersistence::UntilReboot | CredentialPersistence::UntilDelete
    )
}

/// Whether the platform's default store keeps entries between runs.
///
/// Targets without a native store get keyring's mock store, which forgets
/// everything as soon as the entry is dropped.
pub fn default_store_persists() -> bool {
    outlives_process(keyring::default::default_credential_builder().as_ref())
}

/// Serialize `value` as JSON into the keychain account
pub fn save_entry<T: Serialize>(account: KeychainAccount, value: &T) -> Result<(), KeychainError> {
    if !default_store_persists() {
        warn!("No persistent keychain on this platform, entry '{}' not saved", account);
        return Err(KeychainError::Unavailable);
    }
    write_entry(&entry(account)?, account, value)
}

pub fn load_entry<T: DeserializeOwned>(account: KeychainAccount) -> Result<Option<T>, KeychainError> {
    read_entry(&entry(account)?, account)
}

/// Delete the account; a missing entry counts as deleted
pub fn delete_entry(account: KeychainAccount) -> Result<(), KeychainError> {
    remove_entry(&entry(account)?, account)
}

pub(crate) fn write_entry<T: Serialize>(
    entry: &Entry,
    account: KeychainAccount,
    value: &T,
) -> Result<(), KeychainError> {
    let json = serde_json::to_string(value)?;

    match entry.set_password(&json) {
        Ok(()) => {
            debug!("Keychain entry '{}' saved", account);
            Ok(())
        }
        Err(e) => {
            error!("Failed to save keychain entry '{}': {}", account, e);
            Err(e.into())
        }
    }
}

pub(crate) fn read_entry<T: DeserializeOwned>(
    entry: &Entry,
    account: KeychainAccount,
) -> Result<Option<T>, KeychainError> {
    match entry.get_password() {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(keyring::Error::NoEntry) => {
            debug!("No keychain entry '{}'", account);
            Ok(None)
        }
        Err(e) => {
            error!("Failed to load keychain entry '{}': {}", account, e);
            Err(e.into())
        }
    }
}

pub(crate) fn remove_entry(entry: &Entry, account: KeychainAccount) -> Result<(), KeychainError> {
    match entry.delete_credential() {
        Ok(()) => {
            info!("Keychain entry '{}' deleted", account);
            Ok(())
        }
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => {
            error!("Failed to delete keychain entry '{}': {}", account, e);
            Err(e.into())
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredentials {
    username: String,
    password: String,
}

pub fn save_credentials(credentials: &Credentials) -> Result<(), KeychainError> {
    save_entry(
        KeychainAccount::Credentials,
        &StoredCredentials {
            username: credentials.username.clone(),
            password: credentials.password.expose_secret().to_string(),
        },
    )
}

pub fn load_credentials() -> Result<Option<Credentials>, KeychainError> {
    let stored: Option<StoredCredentials> = load_entry(KeychainAccount::Credentials)?;
    Ok(stored.map(|s| Credentials::new(s.username, s.password)))
}

pub fn delete_credentials() -> Result<(), KeychainError> {
    delete_entry(KeychainAccount::Credentials)
}
