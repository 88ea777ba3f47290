//! Material endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{MaterialId, to_major, to_minor};
use domain::{Material, MaterialStatus, MaterialUpdate, NewMaterial};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{MaterialFilter, MaterialSort, SortOrder, Store};

use super::{ListResponse, page, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateMaterialRequest {
    pub name: String,
    pub material_type: String,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub pack_price: Decimal,
    pub units_per_pack: u32,
    #[serde(default)]
    pub count_left: i64,
}

#[derive(Deserialize)]
pub struct UpdateMaterialRequest {
    pub status: Option<MaterialStatus>,
    pub name: Option<String>,
    pub material_type: Option<String>,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub pack_price: Option<Decimal>,
    pub units_per_pack: Option<u32>,
}

/// Signed stock movement: positive receives, negative writes off.
#[derive(Deserialize)]
pub struct StockRequest {
    pub delta: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaterialQuery {
    pub material_type: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<MaterialSort>,
    pub order: Option<SortOrder>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct MaterialResponse {
    pub id: String,
    pub version: i64,
    pub name: String,
    pub material_type: String,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub status: MaterialStatus,
    pub pack_price: Decimal,
    pub unit_price: Decimal,
    pub units_per_pack: u32,
    pub count_left: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Material> for MaterialResponse {
    fn from(m: Material) -> Self {
        Self {
            id: m.id.to_string(),
            version: m.version.as_i64(),
            name: m.name,
            material_type: m.material_type,
            detail: m.detail,
            description: m.description,
            status: m.status,
            pack_price: to_major(m.pack_price),
            unit_price: to_major(m.unit_price),
            units_per_pack: m.units_per_pack,
            count_left: m.count_left,
            created_at: m.created_at,
        }
    }
}

// -- Handlers --

/// POST /materials
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateMaterialRequest>,
) -> Result<(StatusCode, Json<MaterialResponse>), ApiError> {
    let material = state
        .catalog
        .create_material(NewMaterial {
            name: req.name,
            material_type: req.material_type,
            detail: req.detail,
            description: req.description,
            pack_price: to_minor(req.pack_price)?,
            units_per_pack: req.units_per_pack,
            count_left: req.count_left,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(material.into())))
}

/// GET /materials
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<MaterialQuery>,
) -> Result<Json<ListResponse<MaterialResponse>>, ApiError> {
    let filter = MaterialFilter {
        material_type: query.material_type,
        search: query.search,
        sort_by: query.sort_by.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };
    let listing = state
        .catalog
        .list_materials(&filter, page(query.skip, query.limit))
        .await?;
    Ok(Json(ListResponse::from_listing(listing, Into::into)))
}

/// GET /materials/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MaterialResponse>, ApiError> {
    let id: MaterialId = parse_id(&id)?;
    Ok(Json(state.catalog.get_material(id).await?.into()))
}

/// PATCH /materials/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMaterialRequest>,
) -> Result<Json<MaterialResponse>, ApiError> {
    let id: MaterialId = parse_id(&id)?;
    let update = MaterialUpdate {
        status: req.status,
        name: req.name,
        material_type: req.material_type,
        detail: req.detail,
        description: req.description,
        pack_price: req.pack_price.map(to_minor).transpose()?,
        units_per_pack: req.units_per_pack,
    };
    Ok(Json(state.catalog.update_material(id, update).await?.into()))
}

/// DELETE /materials/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: MaterialId = parse_id(&id)?;
    state.catalog.delete_material(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /materials/{id}/stock
#[tracing::instrument(skip(state, req))]
pub async fn adjust_stock<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<Json<MaterialResponse>, ApiError> {
    let id: MaterialId = parse_id(&id)?;
    Ok(Json(state.catalog.adjust_stock(id, req.delta).await?.into()))
}
