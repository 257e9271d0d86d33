use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use uuid::Uuid;

use super::{
    auth::AuthService,
    utils::{auth_guard, validate_auth_token},
};
use crate::engine::{
    CheckoutItem, CheckoutRequest, DepositRequest, TransactionEngine, WithdrawRequest,
};
use crate::error::AppError;

// The caller is always the token subject, so bodies carry no user id.
#[derive(Debug, Deserialize)]
pub struct AmountBody {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub products: Vec<CheckoutItem>,
}

type TxState = (Arc<AuthService>, Arc<TransactionEngine>);

async fn deposit(
    headers: HeaderMap,
    State((service, engine)): State<TxState>,
    Json(body): Json<AmountBody>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;

    let response = engine
        .deposit(DepositRequest {
            user_id,
            amount: body.amount,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn withdraw(
    headers: HeaderMap,
    State((service, engine)): State<TxState>,
    Json(body): Json<AmountBody>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;

    let response = engine
        .withdraw(WithdrawRequest {
            user_id,
            amount: body.amount,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn checkout(
    headers: HeaderMap,
    State((service, engine)): State<TxState>,
    Json(body): Json<CheckoutBody>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;

    let response = engine
        .checkout(CheckoutRequest {
            user_id,
            products: body.products,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

// wallet history of the caller, newest first
async fn list_transactions(
    headers: HeaderMap,
    State((service, engine)): State<TxState>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;
    let history = engine.history(user_id).await?;
    Ok(Json(history))
}

// a transaction is only visible to the user who made it
async fn get_transaction(
    headers: HeaderMap,
    State((service, engine)): State<TxState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;
    let transaction = engine.get_by_id(transaction_id, user_id).await?;
    Ok(Json(transaction))
}

pub fn tx_routes(service: Arc<AuthService>, engine: Arc<TransactionEngine>) -> Router {
    Router::new()
        .route("/transactions/deposit", post(deposit))
        .route("/transactions/withdraw", post(withdraw))
        .route("/transactions/checkout", post(checkout))
        .route("/transactions/wallet", get(list_transactions))
        .route("/transactions/:transaction_id", get(get_transaction))
        .route_layer(auth_guard())
        .route_layer(CompressionLayer::new().gzip(true))
        .with_state((service, engine))
}
