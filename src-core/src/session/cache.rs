use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use keyring::credential::CredentialBuilder;
use keyring::Entry;

use crate::keychain::{self, KeychainAccount, KeychainError};
use crate::sync::lock;

/// A session token as persisted between runs
#[derive(Clone)]
pub struct CachedToken {
    pub token: SecretString,
    pub issued_at: SystemTime,
}

impl CachedToken {
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            issued_at: SystemTime::now(),
        }
    }
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Persistent token cache: read at startup, written on login, cleared on logout
/// or confirmed invalidation.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Result<Option<CachedToken>, KeychainError>;
    fn store(&self, token: &CachedToken) -> Result<(), KeychainError>;
    fn clear(&self) -> Result<(), KeychainError>;

    /// Whether stored tokens survive a restart
    fn persistent(&self) -> bool {
        true
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
    token: String,
    /// Seconds since the Unix epoch
    issued_at: u64,
}

/// Token cache backed by the OS keychain
#[derive(Debug)]
pub struct KeychainTokenCache {
    entry: Entry,
    persistent: bool,
}

impl KeychainTokenCache {
    /// Cache in the platform's default keychain
    pub fn new() -> Result<Self, KeychainError> {
        Ok(Self {
            entry: keychain::entry(KeychainAccount::SessionToken)?,
            persistent: keychain::default_store_persists(),
        })
    }

    /// Cache in the store made by `builder`
    pub fn with_store(builder: &CredentialBuilder) -> Result<Self, KeychainError> {
        Ok(Self {
            entry: keychain::entry_in(builder, KeychainAccount::SessionToken)?,
            persistent: keychain::outlives_process(builder),
        })
    }
}

impl TokenCache for KeychainTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, KeychainError> {
        let stored: Option<StoredToken> =
            keychain::read_entry(&self.entry, KeychainAccount::SessionToken)?;
        Ok(stored
            .filter(|s| !s.token.is_empty())
            .map(|s| CachedToken {
                token: SecretString::from(s.token),
                issued_at: UNIX_EPOCH + Duration::from_secs(s.issued_at),
            }))
    }

    fn store(&self, token: &CachedToken) -> Result<(), KeychainError> {
        let issued_at = token
            .issued_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        keychain::write_entry(
            &self.entry,
            KeychainAccount::SessionToken,
            &StoredToken {
                token: token.token.expose_secret().to_string(),
                issued_at,
            },
        )
    }

    fn clear(&self) -> Result<(), KeychainError> {
        keychain::remove_entry(&self.entry, KeychainAccount::SessionToken)
    }

    fn persistent(&self) -> bool {
        self.persistent
    }
}

/// Token cache held in memory, standing in for a persistent store in tests
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    token: Mutex<Option<CachedToken>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(CachedToken::new(SecretString::from(token)))),
        }
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.token)
            .as_ref()
            .map(|t| t.token.expose_secret().to_string())
    }
}

impl TokenCache for MemoryTokenCache {
    fn load(&self) -> Result<Option<CachedToken>, KeychainError> {
        Ok(lock(&self.token).clone())
    }

    fn store(&self, token: &CachedToken) -> Result<(), KeychainError> {
        *lock(&self.token) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), KeychainError> {
        *lock(&self.token) = None;
        Ok(())
    }
}
