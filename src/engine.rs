//! The transaction engine: deposits, withdrawals and checkouts as single
//! database transactions against the shared wallet and product rows.
//!
//! Every write operation follows the same shape. The request is validated
//! before any connection is taken. A database transaction is opened and the
//! caller's wallet row is locked with `SELECT ... FOR UPDATE`. All business
//! rules are checked against that locked state, and only then are the
//! balance, the transaction record and (for checkouts) the line items and
//! stock written. [`finish`] is the only place that commits or rolls back.
//!
//! Serialization between concurrent requests is left entirely to Postgres:
//! the wallet row lock orders operations on one wallet, and the conditional
//! stock decrement orders checkouts on one product. Nothing is retried here.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::Config;
use crate::db::product::{Product, ProductRepository};
use crate::db::tx::{
    NewTransaction, NewTransactionDetail, Transaction as TransactionRecord,
    TransactionRepository, TransactionStatus, TransactionType, TransactionWithDetails,
};
use crate::db::wallet::WalletRepository;
use crate::error::AppError;
use crate::validation::{within_money_range, FieldError, Validate, Validator, MONEY_LIMIT};

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub qty: i32,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub products: Vec<CheckoutItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateTransactionResponse {
    pub transaction_id: String,
}

/// History entry. `total_amount` is signed for display: withdrawals are
/// shown negative, while the stored value is always positive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionView {
    fn from(record: TransactionRecord) -> Self {
        let total_amount = match record.transaction_type {
            TransactionType::Withdraw => -record.total_amount,
            _ => record.total_amount,
        };
        Self {
            id: record.id,
            user_id: record.user_id,
            transaction_type: record.transaction_type,
            status: record.status,
            total_amount,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl Validate for DepositRequest {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new().positive_amount("amount", self.amount).finish()
    }
}

impl Validate for WithdrawRequest {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new().positive_amount("amount", self.amount).finish()
    }
}

impl Validate for CheckoutRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut validator = Validator::new();
        validator.check(
            !self.products.is_empty(),
            "products",
            "products must contain at least 1 item",
        );
        for (i, item) in self.products.iter().enumerate() {
            validator.check(
                item.qty > 0,
                format!("products[{i}].qty"),
                "qty must be greater than 0",
            );
        }
        validator.finish()
    }
}

/// What a checkout will write, computed from the product snapshot before any
/// write happens.
#[derive(Debug, PartialEq)]
struct CheckoutPlan {
    total_amount: Decimal,
    details: Vec<NewTransactionDetail>,
}

fn distinct_product_ids(items: &[CheckoutItem]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .map(|item| item.product_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn plan_checkout(
    buyer_id: Uuid,
    items: &[CheckoutItem],
    requested_ids: &[Uuid],
    products: &HashMap<Uuid, Product>,
) -> Result<CheckoutPlan, AppError> {
    if products.len() != requested_ids.len() {
        let missing = requested_ids
            .iter()
            .find(|id| !products.contains_key(id))
            .copied()
            .unwrap_or_default();
        return Err(AppError::ProductNotFound(missing));
    }

    let mut total_amount = Decimal::ZERO;
    let mut details = Vec::with_capacity(items.len());

    for item in items {
        let product = products
            .get(&item.product_id)
            .ok_or(AppError::ProductNotFound(item.product_id))?;

        if product.stock < item.qty {
            return Err(AppError::ProductStockNotEnough(product.name.clone()));
        }
        if product.owner_id == buyer_id {
            return Err(AppError::CannotPurchaseOwnProduct);
        }

        total_amount = product
            .price
            .checked_mul(Decimal::from(item.qty))
            .and_then(|line| total_amount.checked_add(line))
            .filter(|total| within_money_range(*total))
            .ok_or_else(|| {
                AppError::Validation(vec![FieldError::new(
                    "products",
                    format!("order total must be less than {MONEY_LIMIT}"),
                )])
            })?;

        details.push(NewTransactionDetail {
            product_id: product.id,
            qty: item.qty,
            price: product.price,
        });
    }

    Ok(CheckoutPlan {
        total_amount,
        details,
    })
}

/// Balance after a deposit or withdrawal of `amount`. A withdrawal may not
/// go below zero and no balance may leave the `NUMERIC(20, 2)` range.
fn next_balance(
    transaction_type: TransactionType,
    balance: Decimal,
    amount: Decimal,
) -> Result<Decimal, AppError> {
    match transaction_type {
        TransactionType::Withdraw => {
            if balance < amount {
                return Err(AppError::InsufficientBalance);
            }
            Ok(balance - amount)
        }
        _ => balance
            .checked_add(amount)
            .filter(|next| within_money_range(*next))
            .ok_or(AppError::BalanceLimitExceeded),
    }
}

/// Single exit path of every write operation: commit on success, roll back on
/// any error. A failed commit is returned as the operation's error.
async fn finish<T>(
    tx: Transaction<'_, Postgres>,
    outcome: Result<T, AppError>,
) -> Result<T, AppError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("failed to roll back transaction: {rollback_err}");
            }
            Err(err)
        }
    }
}

pub struct TransactionEngine {
    pool: PgPool,
    wallets: WalletRepository,
    products: ProductRepository,
    transactions: TransactionRepository,
    timeout: Duration,
}

impl TransactionEngine {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            wallets: WalletRepository::new(pool.clone()),
            products: ProductRepository::new(pool.clone()),
            transactions: TransactionRepository::new(pool.clone()),
            pool,
            timeout: config.service_timeout,
        }
    }

    // Dropping the future on timeout drops any open sqlx transaction, which
    // rolls it back.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout),
        }
    }

    fn report(
        op: &'static str,
        result: Result<Uuid, AppError>,
    ) -> Result<CreateTransactionResponse, AppError> {
        match result {
            Ok(id) => {
                tracing::info!("{op} transaction committed: {id}");
                Ok(CreateTransactionResponse {
                    transaction_id: id.to_string(),
                })
            }
            Err(err) => {
                tracing::warn!("{op} transaction aborted: {err}");
                Err(err)
            }
        }
    }

    #[tracing::instrument(name = "deposit", skip(self, req), fields(user_id = %req.user_id))]
    pub async fn deposit(&self, req: DepositRequest) -> Result<CreateTransactionResponse, AppError> {
        req.validate()?;

        let result = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;
                let outcome = self
                    .apply_balance_change(&mut tx, req.user_id, TransactionType::Deposit, req.amount)
                    .await;
                finish(tx, outcome).await
            })
            .await;

        Self::report("deposit", result)
    }

    #[tracing::instrument(name = "withdraw", skip(self, req), fields(user_id = %req.user_id))]
    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<CreateTransactionResponse, AppError> {
        req.validate()?;

        let result = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;
                let outcome = self
                    .apply_balance_change(&mut tx, req.user_id, TransactionType::Withdraw, req.amount)
                    .await;
                finish(tx, outcome).await
            })
            .await;

        Self::report("withdraw", result)
    }

    #[tracing::instrument(name = "checkout", skip(self, req), fields(user_id = %req.user_id, items = req.products.len()))]
    pub async fn checkout(&self, req: CheckoutRequest) -> Result<CreateTransactionResponse, AppError> {
        req.validate()?;

        let result = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;
                let outcome = self.apply_checkout(&mut tx, &req).await;
                finish(tx, outcome).await
            })
            .await;

        Self::report("checkout", result)
    }

    /// Newest first, amounts signed for display.
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<TransactionView>, AppError> {
        let records = self
            .bounded(self.transactions.history_by_user(user_id))
            .await?;
        Ok(records.into_iter().map(TransactionView::from).collect())
    }

    pub async fn get_by_id(
        &self,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<TransactionWithDetails, AppError> {
        self.bounded(self.transactions.get_by_id(transaction_id, user_id))
            .await
    }

    async fn apply_balance_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Result<Uuid, AppError> {
        let wallet = self.wallets.get_for_update(tx, user_id).await?;

        let balance = next_balance(transaction_type, wallet.balance, amount)?;

        self.wallets.overwrite_balance(tx, wallet.id, balance).await?;

        self.transactions
            .insert_header(
                tx,
                &NewTransaction {
                    user_id,
                    transaction_type,
                    status: TransactionStatus::Completed,
                    total_amount: amount,
                },
            )
            .await
    }

    async fn apply_checkout(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: &CheckoutRequest,
    ) -> Result<Uuid, AppError> {
        let wallet = self.wallets.get_for_update(tx, req.user_id).await?;

        let product_ids = distinct_product_ids(&req.products);
        let products = self.products.get_by_ids(&mut **tx, &product_ids).await?;
        let plan = plan_checkout(req.user_id, &req.products, &product_ids, &products)?;

        if wallet.balance < plan.total_amount {
            return Err(AppError::InsufficientBalance);
        }

        self.wallets
            .overwrite_balance(tx, wallet.id, wallet.balance - plan.total_amount)
            .await?;

        let transaction_id = self
            .transactions
            .insert_header(
                tx,
                &NewTransaction {
                    user_id: req.user_id,
                    transaction_type: TransactionType::Purchase,
                    status: TransactionStatus::Completed,
                    total_amount: plan.total_amount,
                },
            )
            .await?;

        self.transactions
            .insert_details(tx, transaction_id, &plan.details)
            .await?;

        // decrement in product id order so concurrent checkouts over the same
        // products take row locks in the same order
        let mut decrements: Vec<&NewTransactionDetail> = plan.details.iter().collect();
        decrements.sort_by_key(|detail| detail.product_id);
        for detail in decrements {
            self.products
                .reduce_stock(tx, detail.product_id, detail.qty)
                .await?;
        }

        Ok(transaction_id)
    }
}
