use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::error::AppError;

const PRODUCT_COLUMNS: &str =
    "p.id, p.owner_id, p.name, p.description, p.stock, p.price, p.created_at, p.updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub stock: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row, with the owner's name joined in from `users`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub name: String,
    pub description: String,
    pub stock: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub stock: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct ProductChanges {
    pub name: String,
    pub description: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub owner_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub page: i64,
    pub limit: i64,
}

impl ProductFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

// escape LIKE metacharacters so a name filter is a plain substring match
fn like_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() + 2);
    pattern.push('%');
    for ch in name.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    let mut separator = " WHERE ";

    if let Some(name) = filter.name.as_deref().filter(|name| !name.is_empty()) {
        builder
            .push(separator)
            .push("LOWER(p.name) LIKE ")
            .push_bind(like_pattern(name));
        separator = " AND ";
    }
    if let Some(owner_id) = filter.owner_id {
        builder.push(separator).push("p.owner_id = ").push_bind(owner_id);
        separator = " AND ";
    }
    if let Some(product_id) = filter.product_id {
        builder.push(separator).push("p.id = ").push_bind(product_id);
    }
}

// Product store
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, product: &NewProduct) -> Result<Product, AppError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (owner_id, name, description, stock, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, owner_id, name, description, stock, price, created_at, updated_at
            "#,
        )
        .bind(product.owner_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.stock)
        .bind(product.price)
        .fetch_one(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn list(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT p.id, p.owner_id, u.full_name AS owner_name, p.name, p.description,
                   p.stock, p.price, p.created_at, p.updated_at
            FROM products p
            JOIN users u ON u.id = p.owner_id
            "#,
        );
        push_filters(&mut builder, filter);
        builder
            .push(" ORDER BY p.created_at DESC, p.id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let products = builder
            .build_query_as::<ProductView>()
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    pub async fn count(&self, filter: &ProductFilter) -> Result<i64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(p.id) FROM products p");
        push_filters(&mut builder, filter);

        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn update(&self, id: Uuid, changes: &ProductChanges) -> Result<Product, AppError> {
        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = $1, description = $2, price = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $4
            RETURNING id, owner_id, name, description, stock, price, created_at, updated_at
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.price)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::ProductNotFound(id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ProductNotFound(id));
        }
        Ok(())
    }

    /// Batch point lookup without locking. Ids with no row are simply absent
    /// from the map; the caller compares counts.
    pub async fn get_by_ids<'e, E>(
        &self,
        executor: E,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Product>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(executor)
        .await?;

        Ok(products
            .into_iter()
            .map(|product| (product.id, product))
            .collect())
    }

    /// `stock = stock - amount` guarded by `stock >= amount` in one statement.
    /// Zero matched rows means the product vanished or stock ran short; the two
    /// cases are indistinguishable here.
    pub async fn reduce_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        amount: i32,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND stock >= $1
            "#,
        )
        .bind(amount)
        .bind(id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ProductNotFoundOrInsufficientStock(id));
        }
        Ok(())
    }
}
