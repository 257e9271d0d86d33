use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use super::{
    auth::AuthService,
    utils::{auth_guard, validate_auth_token},
};
use crate::db::wallet::WalletRepository;
use crate::error::AppError;

type WalletState = (Arc<AuthService>, Arc<WalletRepository>);

async fn create_wallet(
    headers: HeaderMap,
    State((service, wallets)): State<WalletState>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;

    let wallet = wallets.create(user_id).await?;
    tracing::info!("wallet {} created for user {}", wallet.id, user_id);

    Ok((StatusCode::CREATED, Json(wallet)))
}

async fn get_wallet(
    headers: HeaderMap,
    State((service, wallets)): State<WalletState>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;
    let wallet = wallets.get_by_user_id(user_id).await?;
    Ok(Json(wallet))
}

pub fn wallet_routes(service: Arc<AuthService>, wallets: Arc<WalletRepository>) -> Router {
    Router::new()
        .route("/wallets", get(get_wallet).post(create_wallet))
        .route_layer(auth_guard())
        .with_state((service, wallets))
}
