//! Product endpoints, including the bill-of-materials and price tiers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BomEntryId, MaterialId, PriceTierId, ProductId, to_major, to_minor};
use domain::{NewPriceTier, NewProduct, PriceTierUpdate, Product, ProductStatus, ProductUpdate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{ProductFilter, ProductSort, SortOrder, Store};

use super::{ListResponse, page, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub size: String,
    pub detail: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub status: Option<ProductStatus>,
    pub name: Option<String>,
    pub size: Option<String>,
    pub detail: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct BomEntryRequest {
    pub material_id: String,
    pub units_per_material: u32,
}

#[derive(Deserialize)]
pub struct UpdateBomEntryRequest {
    pub units_per_material: u32,
}

#[derive(Deserialize)]
pub struct PriceTierRequest {
    pub start: u32,
    pub end: u32,
    pub price: Decimal,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePriceTierRequest {
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub name: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<ProductSort>,
    pub order: Option<SortOrder>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub size: String,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub materials: Vec<BomEntryResponse>,
    pub prices: Vec<PriceTierResponse>,
}

#[derive(Serialize)]
pub struct BomEntryResponse {
    pub id: String,
    pub material_id: String,
    pub units_per_material: u32,
}

#[derive(Serialize)]
pub struct PriceTierResponse {
    pub id: String,
    pub start: u32,
    pub end: u32,
    pub price: Decimal,
    pub description: Option<String>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.to_string(),
            version: p.version.as_i64(),
            name: p.name,
            size: p.size,
            detail: p.detail,
            description: p.description,
            status: p.status,
            created_at: p.created_at,
            materials: p
                .bom
                .into_iter()
                .map(|e| BomEntryResponse {
                    id: e.id.to_string(),
                    material_id: e.material_id.to_string(),
                    units_per_material: e.units_per_material,
                })
                .collect(),
            prices: p
                .price_tiers
                .into_iter()
                .map(|t| PriceTierResponse {
                    id: t.id.to_string(),
                    start: t.start,
                    end: t.end,
                    price: to_major(t.price),
                    description: t.description,
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /products
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .catalog
        .create_product(NewProduct {
            name: req.name,
            size: req.size,
            detail: req.detail,
            description: req.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ListResponse<ProductResponse>>, ApiError> {
    let filter = ProductFilter {
        name: query.name,
        search: query.search,
        sort_by: query.sort_by.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };
    let listing = state
        .catalog
        .list_products(&filter, page(query.skip, query.limit))
        .await?;
    Ok(Json(ListResponse::from_listing(listing, Into::into)))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    Ok(Json(state.catalog.get_product(id).await?.into()))
}

/// PATCH /products/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    let update = ProductUpdate {
        status: req.status,
        name: req.name,
        size: req.size,
        detail: req.detail,
        description: req.description,
    };
    Ok(Json(state.catalog.update_product(id, update).await?.into()))
}

/// DELETE /products/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ProductId = parse_id(&id)?;
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /products/{id}/materials
#[tracing::instrument(skip(state, req))]
pub async fn add_bom_entry<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<BomEntryRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let id: ProductId = parse_id(&id)?;
    let material_id: MaterialId = parse_id(&req.material_id)?;
    let product = state
        .catalog
        .add_bom_entry(id, material_id, req.units_per_material)
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PATCH /products/{id}/materials/{entry_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_bom_entry<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, entry_id)): Path<(String, String)>,
    Json(req): Json<UpdateBomEntryRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    let entry_id: BomEntryId = parse_id(&entry_id)?;
    let product = state
        .catalog
        .update_bom_entry(id, entry_id, req.units_per_material)
        .await?;
    Ok(Json(product.into()))
}

/// DELETE /products/{id}/materials/{entry_id}
#[tracing::instrument(skip(state))]
pub async fn remove_bom_entry<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, entry_id)): Path<(String, String)>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    let entry_id: BomEntryId = parse_id(&entry_id)?;
    Ok(Json(state.catalog.remove_bom_entry(id, entry_id).await?.into()))
}

/// POST /products/{id}/prices
#[tracing::instrument(skip(state, req))]
pub async fn add_price_tier<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<PriceTierRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let id: ProductId = parse_id(&id)?;
    let tier = NewPriceTier {
        start: req.start,
        end: req.end,
        price: to_minor(req.price)?,
        description: req.description,
    };
    let product = state.catalog.add_price_tier(id, tier).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PATCH /products/{id}/prices/{tier_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_price_tier<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, tier_id)): Path<(String, String)>,
    Json(req): Json<UpdatePriceTierRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    let tier_id: PriceTierId = parse_id(&tier_id)?;
    let update = PriceTierUpdate {
        start: req.start,
        end: req.end,
        price: req.price.map(to_minor).transpose()?,
        description: req.description,
    };
    Ok(Json(
        state
            .catalog
            .update_price_tier(id, tier_id, update)
            .await?
            .into(),
    ))
}

/// DELETE /products/{id}/prices/{tier_id}
#[tracing::instrument(skip(state))]
pub async fn remove_price_tier<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, tier_id)): Path<(String, String)>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    let tier_id: PriceTierId = parse_id(&tier_id)?;
    Ok(Json(
        state
            .catalog
            .remove_price_tier(id, tier_id)
            .await?
            .into(),
    ))
}
