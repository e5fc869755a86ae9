//! Bearer-token extraction for the PDP routes.
//!
//! Signature verification is explicitly the caller's responsibility (§4.E);
//! this only pulls the raw token out of the `Authorization` header so
//! [`authz_core::subject::detect`] can decode its claims.

use axum::http::HeaderMap;

use crate::error::AppError;

/// Pull the bearer token out of an `Authorization: Bearer <token>` header.
///
/// # Errors
/// Returns [`AppError::BadRequest`] if the header is missing or malformed.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| AppError::BadRequest("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::BadRequest("Authorization header is not valid UTF-8".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::BadRequest("Authorization header must be 'Bearer <token>'".to_string()))
}
