use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    auth::AuthService,
    utils::{auth_guard, validate_auth_token},
};
use crate::db::product::{
    NewProduct, Product, ProductChanges, ProductFilter, ProductRepository, ProductView,
};
use crate::error::AppError;
use crate::validation::{Validate, Validator};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stock: i32,
    pub price: Decimal,
}

impl Validate for CreateProductRequest {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new()
            .required("name", &self.name)
            .check(self.stock >= 0, "stock", "stock must be 0 or greater")
            .non_negative_amount("price", self.price)
            .finish()
    }
}

/// Stock is not editable here; it only moves through checkout.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
}

impl Validate for UpdateProductRequest {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new()
            .required("name", &self.name)
            .non_negative_amount("price", self.price)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub name: Option<String>,
    pub owner_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Validate for ListProductsQuery {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new()
            .check(self.page.map_or(true, |page| page >= 1), "page", "page must be 1 or greater")
            .check(
                self.limit.map_or(true, |limit| limit >= 1),
                "limit",
                "limit must be 1 or greater",
            )
            .finish()
    }
}

impl From<ListProductsQuery> for ProductFilter {
    fn from(query: ListProductsQuery) -> Self {
        ProductFilter {
            name: query.name,
            owner_id: query.owner_id,
            product_id: query.product_id,
            page: query.page.unwrap_or(DEFAULT_PAGE),
            limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub total_data: i64,
    pub total_page: i64,
    pub page: i64,
    pub limit: i64,
    pub data: Vec<T>,
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if total % limit == 0 {
        total / limit
    } else {
        total / limit + 1
    }
}

// Product catalogue operations outside of checkout
pub struct ProductService {
    repo: ProductRepository,
}

impl ProductService {
    pub fn new(repo: ProductRepository) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        req: CreateProductRequest,
    ) -> Result<Product, AppError> {
        req.validate()?;

        self.repo
            .create(&NewProduct {
                owner_id,
                name: req.name.trim().to_string(),
                description: req.description,
                stock: req.stock,
                price: req.price,
            })
            .await
    }

    pub async fn list(&self, query: ListProductsQuery) -> Result<Paginated<ProductView>, AppError> {
        query.validate()?;
        let filter = ProductFilter::from(query);

        let data = self.repo.list(&filter).await?;
        let total_data = self.repo.count(&filter).await?;

        Ok(Paginated {
            total_data,
            total_page: total_pages(total_data, filter.limit),
            page: filter.page,
            limit: filter.limit,
            data,
        })
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        req: UpdateProductRequest,
    ) -> Result<Product, AppError> {
        req.validate()?;

        let product = self
            .repo
            .get_by_id(product_id)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))?;
        if product.owner_id != user_id {
            return Err(AppError::CannotUpdateNotOwner);
        }

        self.repo
            .update(
                product_id,
                &ProductChanges {
                    name: req.name.trim().to_string(),
                    description: req.description,
                    price: req.price,
                },
            )
            .await
    }

    pub async fn delete(&self, user_id: Uuid, product_id: Uuid) -> Result<(), AppError> {
        let product = self
            .repo
            .get_by_id(product_id)
            .await?
            .ok_or(AppError::ProductNotFound(product_id))?;
        if product.owner_id != user_id {
            return Err(AppError::CannotDeleteNotOwner);
        }

        self.repo.delete(product_id).await
    }
}

type ProductState = (Arc<AuthService>, Arc<ProductService>);

async fn create_product(
    headers: HeaderMap,
    State((auth, products)): State<ProductState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &auth)?;
    let product = products.create(user_id, req).await?;
    tracing::info!("product {} created by {}", product.id, user_id);
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products(
    State((_, products)): State<ProductState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = products.list(query).await?;
    Ok(Json(page))
}

async fn update_product(
    headers: HeaderMap,
    State((auth, products)): State<ProductState>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &auth)?;
    let product = products.update(user_id, product_id, req).await?;
    Ok(Json(product))
}

async fn delete_product(
    headers: HeaderMap,
    State((auth, products)): State<ProductState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &auth)?;
    products.delete(user_id, product_id).await?;
    tracing::info!("product {} deleted by {}", product_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

// listing is public; every write needs a token
pub fn product_routes(auth: Arc<AuthService>, products: Arc<ProductService>) -> Router {
    Router::new()
        .route(
            "/products",
            // the guard only wraps methods registered before it
            post(create_product)
                .route_layer(auth_guard())
                .get(list_products),
        )
        .route(
            "/products/:product_id",
            put(update_product)
                .delete(delete_product)
                .route_layer(auth_guard()),
        )
        .with_state((auth, products))
}
