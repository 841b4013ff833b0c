//! Bearer JWT validation against the auth service's shared HS256 secret.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use roomcast_common::UserIdentity;
use serde::{Deserialize, Serialize};

use super::AuthValidator;
use crate::error::GatewayError;

/// Claims the auth service signs into every access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user's id.
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        // `exp` is required and checked by default.
        let validation = Validation::new(Algorithm::HS256);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl AuthValidator for JwtValidator {
    async fn validate(&self, credential: &str) -> Result<UserIdentity, GatewayError> {
        let token = credential.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        if token.is_empty() {
            return Err(GatewayError::auth("No token provided"));
        }

        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "access token validation failed");
                GatewayError::auth("Invalid or expired token")
            })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(GatewayError::auth("Token has no subject"));
        }

        Ok(UserIdentity::new(claims.sub, claims.username))
    }
}
