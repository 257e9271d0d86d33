use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Wallet store. Balances are only ever written through `overwrite_balance`
// by the transaction engine, after `get_for_update` locked the row.
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: Uuid) -> Result<Wallet, AppError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id, balance)
            VALUES ($1, 0)
            RETURNING id, user_id, balance, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::WalletAlreadyExists
            }
            err => AppError::Database(err),
        })
    }

    /// Plain read for display; never used on a path that writes the balance.
    pub async fn get_by_user_id(&self, user_id: Uuid) -> Result<Wallet, AppError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, created_at, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::WalletNotFound)
    }

    /// Reads the wallet and holds an exclusive row lock until `tx` ends.
    pub async fn get_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<Wallet, AppError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance, created_at, updated_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::WalletNotFound)
    }

    /// Unconditional write; the caller must already hold the row lock from
    /// `get_for_update` inside the same `tx`.
    pub async fn overwrite_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        wallet_id: Uuid,
        balance: Decimal,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2
            "#,
        )
        .bind(balance)
        .bind(wallet_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
