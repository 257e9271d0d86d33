#![allow(dead_code)]

use std::time::Duration;

use marketplace_payments::config::Config;
use marketplace_payments::db::product::{NewProduct, ProductRepository};
use marketplace_payments::db::wallet::WalletRepository;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

/// Connects to `DATABASE_URL` and migrates. Returns `None` (and the calling
/// test passes trivially) when no database is configured.
pub async fn pool() -> Option<PgPool> {
    let Ok(url) = dotenv::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to migrate test database");

    Some(pool)
}

pub fn config(service_timeout: Duration) -> Config {
    Config {
        database_url: String::new(),
        jwt_secret: "integration-secret".to_string(),
        max_connection_pooling: 20,
        port: 0,
        log_file: "test.log".to_string(),
        service_timeout,
        access_token_ttl: Duration::from_secs(60),
        refresh_token_ttl: Duration::from_secs(60),
    }
}

pub async fn create_user(pool: &PgPool) -> Uuid {
    let email = format!("{}@example.test", Uuid::new_v4());
    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO users (email, password_hash, full_name) VALUES ($1, 'unused', 'Test User') RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .expect("failed to insert user")
}

pub async fn create_wallet(pool: &PgPool, user_id: Uuid, balance: i64) {
    let wallet = WalletRepository::new(pool.clone())
        .create(user_id)
        .await
        .expect("failed to create wallet");
    sqlx::query("UPDATE wallets SET balance = $1 WHERE id = $2")
        .bind(Decimal::from(balance))
        .bind(wallet.id)
        .execute(pool)
        .await
        .expect("failed to seed balance");
}

/// A user with a funded wallet.
pub async fn funded_user(pool: &PgPool, balance: i64) -> Uuid {
    let user_id = create_user(pool).await;
    create_wallet(pool, user_id, balance).await;
    user_id
}

pub async fn create_product(pool: &PgPool, owner_id: Uuid, stock: i32, price: i64) -> Uuid {
    ProductRepository::new(pool.clone())
        .create(&NewProduct {
            owner_id,
            name: format!("product-{}", Uuid::new_v4()),
            description: String::new(),
            stock,
            price: Decimal::from(price),
        })
        .await
        .expect("failed to create product")
        .id
}

pub async fn balance(pool: &PgPool, user_id: Uuid) -> Decimal {
    sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("wallet missing")
}

pub async fn stock(pool: &PgPool, product_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .expect("product missing")
}

pub async fn transaction_count(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("count failed")
}

pub async fn detail_count(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM transaction_details td
        JOIN transactions t ON t.id = td.transaction_id
        WHERE t.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .expect("count failed")
}
