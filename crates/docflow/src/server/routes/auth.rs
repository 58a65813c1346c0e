//! Out-of-band credential validation

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::server::state::AppState;
use crate::types::TokenValidation;

/// Body of `POST /auth/validate-token`
#[derive(Debug, Default, Deserialize)]
pub struct ValidateTokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// POST /auth/validate-token - Resolve a token to its owner for other services
pub async fn validate_token(
    State(state): State<AppState>,
    Json(request): Json<ValidateTokenRequest>,
) -> (StatusCode, Json<TokenValidation>) {
    let Some(token) = request
        .token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(TokenValidation::invalid("No token provided")),
        );
    };

    let validation = state.authenticator().validate(token);
    let status = if validation.valid {
        StatusCode::OK
    } else {
        tracing::debug!(
            "Token rejected: {}",
            validation.error.as_deref().unwrap_or("unknown")
        );
        StatusCode::UNAUTHORIZED
    };
    (status, Json(validation))
}
