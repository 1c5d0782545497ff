//! Shared-secret access gate in front of the war room.

use thiserror::Error;

pub const DEFAULT_IDENTITY: &str = "LECHUZA";
pub const DEFAULT_ACCESS_KEY: &str = "LECHUZA";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ACCESS DENIED: INVALID CREDENTIALS")]
pub struct AccessDenied;

#[derive(Debug, Clone)]
pub struct AccessGate {
    identity: String,
    access_key: String,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY, DEFAULT_ACCESS_KEY)
    }
}

impl AccessGate {
    pub fn new(identity: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            access_key: access_key.into(),
        }
    }

    /// Identity is compared after trimming; the key must match exactly.
    pub fn check(&self, identity: &str, access_key: &str) -> Result<(), AccessDenied> {
        if identity.trim() == self.identity && access_key == self.access_key {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }
}
