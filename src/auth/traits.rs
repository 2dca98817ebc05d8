//! Authentication traits and types for connection identity resolution.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The identity a valid access token resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Inactive identities authenticate but are refused service.
    pub active: bool,
}

/// Resolves caller-supplied access tokens to identities.
///
/// Resolution happens exactly once per connection, during the handshake.
/// `Ok(None)` means the token is malformed, forged, or expired; `Err` is
/// reserved for backend failures (never for bad tokens).
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>>;

    fn name(&self) -> &str;
}
