//! JWT extractor
//!
//! Protected handlers take [`CurrentUser`] as an argument; extraction
//! validates the bearer token against the server's JWT service.

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::AppError;

use crate::auth::{CurrentUser, JwtError, JwtService};
use crate::core::AppState;

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Reuse an identity already extracted for this request
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let token = auth_header
            .and_then(JwtService::extract_from_header)
            .ok_or_else(|| {
                tracing::warn!(uri = %parts.uri, "Missing or malformed authorization header");
                AppError::unauthorized()
            })?;

        match state.jwt.validate_token(token) {
            Ok(claims) => {
                let user = CurrentUser::try_from(claims).map_err(|e| {
                    AppError::with_message(
                        shared::ErrorCode::Unauthorized,
                        format!("Malformed claims: {e}"),
                    )
                })?;
                // A valid token is not enough: suspended accounts are
                // rejected on every request. Unmirrored identities pass.
                if state.store.get_user(user.id)?.is_some_and(|u| !u.is_active) {
                    tracing::warn!(user_id = user.id, uri = %parts.uri, "Suspended account rejected");
                    return Err(AppError::forbidden("Account is suspended"));
                }
                parts.extensions.insert(user.clone());
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(uri = %parts.uri, error = %e, "Token validation failed");
                match e {
                    JwtError::ExpiredToken => Err(AppError::with_message(
                        shared::ErrorCode::Unauthorized,
                        "Token expired",
                    )),
                    _ => Err(AppError::unauthorized()),
                }
            }
        }
    }
}
