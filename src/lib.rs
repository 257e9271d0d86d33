//! Marketplace payments backend: user wallets, a product catalogue and a
//! transaction engine that moves money and stock atomically on Postgres.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use sqlx::PgPool;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod routes;
pub mod validation;

use config::Config;
use db::{
    auth::AuthRepository, product::ProductRepository, wallet::WalletRepository,
};
use engine::TransactionEngine;
use routes::{
    auth::{auth_routes, AuthService},
    product::{product_routes, ProductService},
    tx::tx_routes,
    user::user_routes,
    wallet::wallet_routes,
};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB

async fn health_check() -> StatusCode {
    StatusCode::OK
}

// runs inside SetRequestIdLayer, so the id extension is already present
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or_default();
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    )
}

/// Wires every service onto the shared pool and returns the full HTTP router.
pub fn build_router(pool: PgPool, config: &Config) -> Router {
    let auth = Arc::new(AuthService::new(AuthRepository::new(pool.clone()), config));
    let wallets = Arc::new(WalletRepository::new(pool.clone()));
    let products = Arc::new(ProductService::new(ProductRepository::new(pool.clone())));
    let engine = Arc::new(TransactionEngine::new(pool, config));

    let v1 = Router::new()
        .merge(auth_routes(auth.clone()))
        .merge(user_routes(auth.clone()))
        .merge(wallet_routes(auth.clone(), wallets))
        .merge(product_routes(auth.clone(), products))
        .merge(tx_routes(auth, engine));

    // last layer added runs first: assign an id, open the span, echo the id back
    Router::new()
        .route("/health-check", get(health_check))
        .nest("/v1", v1)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{header, Method};
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    // nothing here reaches the database; the pool never connects
    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap()
    }

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/unused".to_string(),
            jwt_secret: "router-test-secret".to_string(),
            max_connection_pooling: 1,
            port: 0,
            log_file: "test.log".to_string(),
            service_timeout: Duration::from_secs(1),
            access_token_ttl: Duration::from_secs(60),
            refresh_token_ttl: Duration::from_secs(60),
        }
    }

    fn token_for(pool: &PgPool, config: &Config) -> String {
        AuthService::new(AuthRepository::new(pool.clone()), config)
            .access_token(Uuid::new_v4())
            .unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_authorization_is_rejected() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(post_json("/v1/transactions/deposit", None, json!({"amount": "10"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(post_json(
                "/v1/transactions/withdraw",
                Some("not-a-jwt"),
                json!({"amount": "10"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_zero_deposit_fails_validation_before_database() {
        let pool = lazy_pool();
        let config = test_config();
        let token = token_for(&pool, &config);
        let router = build_router(pool, &config);

        let response = router
            .oneshot(post_json(
                "/v1/transactions/deposit",
                Some(&token),
                json!({"amount": "0"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "validation_failed");
        assert_eq!(body["errors"][0]["field"], "amount");
    }

    #[tokio::test]
    async fn test_empty_checkout_fails_validation() {
        let pool = lazy_pool();
        let config = test_config();
        let token = token_for(&pool, &config);
        let router = build_router(pool, &config);

        let response = router
            .oneshot(post_json(
                "/v1/transactions/checkout",
                Some(&token),
                json!({"products": []}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["errors"][0]["field"], "products");
    }

    #[tokio::test]
    async fn test_product_listing_rejects_page_zero() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(Request::get("/v1/products?page=0").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_product_create_requires_authorization() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(post_json(
                "/v1/products",
                None,
                json!({"name": "mug", "stock": 1, "price": "10"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_response_carries_generated_request_id() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let request_id = response.headers().get("x-request-id").unwrap();
        assert!(Uuid::parse_str(request_id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_echoed() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(
                Request::get("/health-check")
                    .header("x-request-id", "order-7f3a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "order-7f3a");
    }

    #[tokio::test]
    async fn test_rejected_request_still_has_request_id() {
        let router = build_router(lazy_pool(), &test_config());

        let response = router
            .oneshot(post_json("/v1/transactions/deposit", None, json!({"amount": "10"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-request-id"));
    }
}
