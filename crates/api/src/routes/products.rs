//! Merchant catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{MerchantId, ProductId};
use domain::{Money, Product};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::{AppState, parse_id};

#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    pub merchant_id: MerchantId,
    pub name: String,
    pub unit_price: Money,
    #[serde(default)]
    pub initial_stock: u32,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct RepriceRequest {
    pub unit_price: Money,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub merchant_id: Option<MerchantId>,
    pub name: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
    pub reserved_quantity: u32,
}

impl ProductResponse {
    fn from_product(product: &Product) -> Result<Self, ApiError> {
        let id = product
            .product_id()
            .ok_or_else(|| ApiError::Internal("product without an id".to_string()))?;
        Ok(Self {
            id,
            merchant_id: product.merchant_id(),
            name: product.name().to_string(),
            unit_price: product.unit_price(),
            stock_quantity: product.stock_quantity(),
            reserved_quantity: product.reserved_quantity(),
        })
    }
}

/// POST /products
#[tracing::instrument(skip(state, req), fields(merchant_id = %req.merchant_id))]
pub async fn register<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .engine
        .register_product(req.merchant_id, req.name, req.unit_price, req.initial_stock)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProductResponse::from_product(&product)?),
    ))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id("product", &id)?;
    let product = state.engine.get_product(product_id).await?;
    Ok(Json(ProductResponse::from_product(&product)?))
}

/// POST /products/{id}/restock
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn restock<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id("product", &id)?;
    let product = state.engine.restock(product_id, req.quantity).await?;
    Ok(Json(ProductResponse::from_product(&product)?))
}

/// PUT /products/{id}/price
#[tracing::instrument(skip(state, req))]
pub async fn reprice<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RepriceRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id("product", &id)?;
    let product = state.engine.reprice(product_id, req.unit_price).await?;
    Ok(Json(ProductResponse::from_product(&product)?))
}
