use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use tower_http::validate_request::ValidateRequestHeaderLayer;
use uuid::Uuid;

use super::auth::AuthService;
use crate::error::AppError;
use crate::validation::Validator;

const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 20;

type AuthorizationCheck = fn(&mut Request<Body>) -> Result<(), Response>;

// rejects requests that carry no Authorization header at all; the token
// itself is verified by the handler
fn require_authorization(request: &mut Request<Body>) -> Result<(), Response> {
    if request.headers().contains_key(AUTHORIZATION) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("missing authorization header".to_string()).into_response())
    }
}

pub fn auth_guard() -> ValidateRequestHeaderLayer<AuthorizationCheck> {
    ValidateRequestHeaderLayer::custom(require_authorization as AuthorizationCheck)
}

/// Accepts `Bearer <jwt>` as well as a bare token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("empty bearer token".to_string()));
    }
    Ok(token)
}

#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<Uuid, AppError> {
    let token = bearer_token(headers)?;
    service.verify_token(token)
}

#[inline]
pub fn check_password<'v>(validator: &'v mut Validator, password: &str) -> &'v mut Validator {
    let len = password.chars().count();
    validator
        .check(
            (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len),
            "password",
            format!("password must be between {PASSWORD_MIN_LEN} and {PASSWORD_MAX_LEN} characters"),
        )
        .check(
            password.chars().any(|c| c.is_uppercase()),
            "password",
            "password must contain at least one uppercase letter",
        )
        .check(
            password.chars().any(|c| c.is_lowercase()),
            "password",
            "password must contain at least one lowercase letter",
        )
        .check(
            password.chars().any(|c| c.is_ascii_digit()),
            "password",
            "password must contain at least one digit",
        )
        .check(
            password.chars().any(|c| !c.is_alphanumeric()),
            "password",
            "password must contain at least one special character",
        )
}
