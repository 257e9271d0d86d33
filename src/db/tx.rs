use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction as PgTransaction};
use uuid::Uuid;

use crate::error::AppError;

/// Mirrors the seeded `transaction_types` table; the name is what the join
/// returns, the id is what gets stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Purchase,
    Refund,
}

impl TransactionType {
    pub const fn id(self) -> i32 {
        match self {
            TransactionType::Deposit => 1,
            TransactionType::Withdraw => 2,
            TransactionType::Purchase => 3,
            TransactionType::Refund => 4,
        }
    }
}

/// Every synchronous path writes `Completed`; the other states are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub id: Uuid,
    pub product_id: Uuid,
    /// `None` once the product has been deleted.
    pub product_name: Option<String>,
    pub qty: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWithDetails {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub details: Vec<TransactionDetail>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransactionDetail {
    pub product_id: Uuid,
    pub qty: i32,
    /// Unit price at the moment of purchase.
    pub price: Decimal,
}

// header and detail columns of the by-id join; detail columns are NULL when
// the transaction has no line items
#[derive(FromRow)]
struct TransactionDetailRow {
    id: Uuid,
    user_id: Uuid,
    transaction_type: TransactionType,
    status: TransactionStatus,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    detail_id: Option<Uuid>,
    product_id: Option<Uuid>,
    product_name: Option<String>,
    qty: Option<i32>,
    price: Option<Decimal>,
}

impl TransactionDetailRow {
    fn header(&self) -> Transaction {
        Transaction {
            id: self.id,
            user_id: self.user_id,
            transaction_type: self.transaction_type,
            status: self.status,
            total_amount: self.total_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn detail(self) -> Option<TransactionDetail> {
        Some(TransactionDetail {
            id: self.detail_id?,
            product_id: self.product_id?,
            product_name: self.product_name,
            qty: self.qty?,
            price: self.price?,
        })
    }
}

// Transaction store
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_header(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        transaction: &NewTransaction,
    ) -> Result<Uuid, AppError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO transactions (user_id, transaction_type_id, status, total_amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(transaction.user_id)
        .bind(transaction.transaction_type.id())
        .bind(transaction.status)
        .bind(transaction.total_amount)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Bulk insert of line items. Any difference between the rows written and
    /// `details.len()` is reported as `DetailInsertCountMismatch`.
    pub async fn insert_details(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        transaction_id: Uuid,
        details: &[NewTransactionDetail],
    ) -> Result<(), AppError> {
        if details.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO transaction_details (transaction_id, product_id, qty, price) ",
        );
        builder.push_values(details, |mut row, detail| {
            row.push_bind(transaction_id)
                .push_bind(detail.product_id)
                .push_bind(detail.qty)
                .push_bind(detail.price);
        });

        let inserted = builder.build().execute(&mut **tx).await?.rows_affected();
        // the caller's transaction is still open here; the engine's `finish`
        // rolls back the header, balance and stock writes on this error
        check_inserted(details.len() as u64, inserted)
    }

    pub async fn history_by_user(&self, user_id: Uuid) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT t.id, t.user_id, tt.name AS transaction_type, t.status, t.total_amount,
                   t.created_at, t.updated_at
            FROM transactions t
            JOIN transaction_types tt ON tt.id = t.transaction_type_id
            WHERE t.user_id = $1
            ORDER BY t.created_at DESC, t.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    pub async fn get_by_id(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<TransactionWithDetails, AppError> {
        let rows = sqlx::query_as::<_, TransactionDetailRow>(
            r#"
            SELECT t.id, t.user_id, tt.name AS transaction_type, t.status, t.total_amount,
                   t.created_at, t.updated_at,
                   td.id AS detail_id, td.product_id, p.name AS product_name, td.qty, td.price
            FROM transactions t
            JOIN transaction_types tt ON tt.id = t.transaction_type_id
            LEFT JOIN transaction_details td ON td.transaction_id = t.id
            LEFT JOIN products p ON p.id = td.product_id
            WHERE t.id = $1 AND t.user_id = $2
            ORDER BY td.created_at, td.id
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let transaction = rows
            .first()
            .map(TransactionDetailRow::header)
            .ok_or(AppError::TransactionNotFound)?;
        let details = rows
            .into_iter()
            .filter_map(TransactionDetailRow::detail)
            .collect();

        Ok(TransactionWithDetails {
            transaction,
            details,
        })
    }
}

fn check_inserted(expected: u64, inserted: u64) -> Result<(), AppError> {
    if inserted != expected {
        return Err(AppError::DetailInsertCountMismatch { expected, inserted });
    }
    Ok(())
}
