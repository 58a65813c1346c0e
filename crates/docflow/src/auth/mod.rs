//! Credential validation for submission and push boundaries

mod jwt;

pub use jwt::{Claims, JwtAuthenticator};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;

use crate::error::Error;
use crate::types::{OwnerId, TokenValidation};

/// Resolves a bearer credential to an owner
pub trait Authenticator: Send + Sync {
    fn validate(&self, token: &str) -> TokenValidation;
}

/// Owner resolved from the `Authorization: Bearer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub OwnerId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn Authenticator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Unauthorized("Missing bearer token".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| Error::Unauthorized("Authorization scheme must be Bearer".into()))?;

        let authenticator = Arc::<dyn Authenticator>::from_ref(state);
        let validation = authenticator.validate(token);
        match (validation.valid, validation.user_id) {
            (true, Some(owner)) => Ok(AuthenticatedUser(owner)),
            _ => Err(Error::Unauthorized(
                validation
                    .error
                    .unwrap_or_else(|| "Could not validate credentials".into()),
            )),
        }
    }
}
