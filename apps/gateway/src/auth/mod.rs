//! Credential validation for the gateway's authentication gate.

pub mod jwt;

use async_trait::async_trait;
use roomcast_common::UserIdentity;

use crate::error::GatewayError;

/// Resolves an opaque credential to the identity it was issued for.
///
/// Backed by HS256 JWTs in production; tests substitute fixed token tables.
#[async_trait]
pub trait AuthValidator: Send + Sync {
    /// Returns `GatewayError::Auth` with a client-facing reason on rejection.
    async fn validate(&self, credential: &str) -> Result<UserIdentity, GatewayError>;
}
