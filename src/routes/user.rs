use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::IntoResponse, routing::get, Json, Router};
use serde::Deserialize;

use super::{
    auth::AuthService,
    utils::{auth_guard, validate_auth_token},
};
use crate::error::AppError;
use crate::validation::{Validate, Validator};

#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub full_name: String,
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new().required("full_name", &self.full_name).finish()
    }
}

async fn get_user(
    headers: HeaderMap,
    State(service): State<Arc<AuthService>>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;

    // a valid token can outlive its user
    let user = service
        .repo
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

    Ok(Json(user))
}

async fn update_user(
    headers: HeaderMap,
    State(service): State<Arc<AuthService>>,
    Json(payload): Json<UpdateUser>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;
    payload.validate()?;

    let user = service
        .repo
        .update_full_name(user_id, payload.full_name.trim())
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;
    tracing::info!("user updated: {}", user_id);

    Ok(Json(user))
}

pub fn user_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/users/me", get(get_user).put(update_user))
        .route_layer(auth_guard())
        .with_state(service)
}
