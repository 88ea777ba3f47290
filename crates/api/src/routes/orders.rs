//! Order endpoints: lines, costs, payments and lifecycle transitions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{
    AdditionalCostId, CustomerId, MaterialUsageId, OrderId, OrderLineId, ProductId, to_major,
    to_minor,
};
use domain::{LineRequest, NewOrder, Order, OrderStatus, UsageAdjustment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{OrderFilter, OrderSort, SortOrder, Store};

use super::{ListResponse, page, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer: Option<String>,
    pub customer_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineBody>,
}

#[derive(Deserialize)]
pub struct LineBody {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct SetLinesRequest {
    pub lines: Vec<LineBody>,
}

#[derive(Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CostRequest {
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

#[derive(Deserialize)]
pub struct UsageBody {
    pub usage_id: String,
    pub actual_usage: u32,
}

#[derive(Deserialize)]
pub struct AdjustUsageRequest {
    pub usages: Vec<UsageBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub customer: Option<String>,
    pub customer_id: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_by: Option<OrderSort>,
    pub order: Option<SortOrder>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub version: i64,
    pub status: OrderStatus,
    pub customer: Option<String>,
    pub customer_id: Option<String>,
    pub description: Option<String>,
    pub total_price: Decimal,
    pub materials_price: Decimal,
    pub paid: Decimal,
    pub remains: Decimal,
    pub prepay_sum: Decimal,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLineResponse>,
    pub costs: Vec<CostResponse>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub materials: Vec<UsageResponse>,
}

#[derive(Serialize)]
pub struct UsageResponse {
    pub id: String,
    pub material_id: String,
    pub units_per_material: u32,
    pub material_price: Decimal,
    pub budgeted_usage: u32,
    pub actual_usage: u32,
    pub budgeted_cost: Decimal,
    pub actual_cost: Decimal,
}

#[derive(Serialize)]
pub struct CostResponse {
    pub id: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let remains = to_major(order.remains());
        let prepay_sum = to_major(order.prepay_sum());
        Self {
            id: order.id.to_string(),
            version: order.version.as_i64(),
            status: order.status,
            customer: order.customer,
            customer_id: order.customer_id.map(|c| c.to_string()),
            description: order.description,
            total_price: to_major(order.total_price),
            materials_price: to_major(order.materials_price),
            paid: to_major(order.paid),
            remains,
            prepay_sum,
            created_at: order.created_at,
            confirmed_at: order.confirmed_at,
            ready_at: order.ready_at,
            shipped_at: order.shipped_at,
            completed_at: order.completed_at,
            canceled_at: order.canceled_at,
            lines: order
                .lines
                .into_iter()
                .map(|line| OrderLineResponse {
                    id: line.id.to_string(),
                    product_id: line.product_id.to_string(),
                    subtotal: to_major(line.subtotal()),
                    product_name: line.product_name,
                    quantity: line.quantity,
                    unit_price: to_major(line.unit_price),
                    materials: line
                        .usages
                        .into_iter()
                        .map(|u| UsageResponse {
                            budgeted_cost: to_major(u.budgeted_cost()),
                            actual_cost: to_major(u.actual_cost()),
                            id: u.id.to_string(),
                            material_id: u.material_id.to_string(),
                            units_per_material: u.units_per_material,
                            material_price: to_major(u.material_price),
                            budgeted_usage: u.budgeted_usage,
                            actual_usage: u.actual_usage,
                        })
                        .collect(),
                })
                .collect(),
            costs: order
                .costs
                .into_iter()
                .map(|c| CostResponse {
                    id: c.id.to_string(),
                    amount: to_major(c.amount),
                    description: c.description,
                })
                .collect(),
        }
    }
}

fn line_requests(lines: Vec<LineBody>) -> Result<Vec<LineRequest>, ApiError> {
    lines
        .into_iter()
        .map(|line| {
            Ok(LineRequest {
                product_id: parse_id::<ProductId>(&line.product_id)?,
                quantity: line.quantity,
            })
        })
        .collect()
}

// -- Handlers --

/// POST /orders: create an order, optionally with its first lines.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id = req
        .customer_id
        .as_deref()
        .map(parse_id::<CustomerId>)
        .transpose()?;
    let lines = line_requests(req.lines)?;

    let mut order = state
        .orders
        .create(NewOrder {
            customer: req.customer,
            customer_id,
            description: req.description,
        })
        .await?;
    if !lines.is_empty() {
        order = state.orders.set_lines(order.id, lines).await?;
    }

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<ListResponse<OrderResponse>>, ApiError> {
    let filter = OrderFilter {
        created_from: query.created_from,
        created_to: query.created_to,
        customer: query.customer,
        customer_id: query
            .customer_id
            .as_deref()
            .map(parse_id::<CustomerId>)
            .transpose()?,
        status: query.status,
        sort_by: query.sort_by.unwrap_or_default(),
        order: query.order.unwrap_or_default(),
    };
    let listing = state
        .orders
        .list(&filter, page(query.skip, query.limit))
        .await?;
    Ok(Json(ListResponse::from_listing(listing, Into::into)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.get(id).await?.into()))
}

/// PUT /orders/{id}/lines: replace all lines of a CREATED order.
#[tracing::instrument(skip(state, req))]
pub async fn set_lines<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<SetLinesRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let lines = line_requests(req.lines)?;
    Ok(Json(state.orders.set_lines(id, lines).await?.into()))
}

/// POST /orders/{id}/lines
#[tracing::instrument(skip(state, req))]
pub async fn add_line<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<LineBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let request = LineRequest {
        product_id: parse_id(&req.product_id)?,
        quantity: req.quantity,
    };
    Ok(Json(state.orders.add_line(id, request).await?.into()))
}

/// PATCH /orders/{id}/lines/{line_id}
#[tracing::instrument(skip(state, req))]
pub async fn change_line_quantity<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, line_id)): Path<(String, String)>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let line_id: OrderLineId = parse_id(&line_id)?;
    let order = state
        .orders
        .change_line_quantity(id, line_id, req.quantity)
        .await?;
    Ok(Json(order.into()))
}

/// DELETE /orders/{id}/lines/{line_id}
#[tracing::instrument(skip(state))]
pub async fn remove_line<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, line_id)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let line_id: OrderLineId = parse_id(&line_id)?;
    Ok(Json(state.orders.remove_line(id, line_id).await?.into()))
}

/// POST /orders/{id}/costs
#[tracing::instrument(skip(state, req))]
pub async fn add_cost<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CostRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let amount = to_minor(req.amount)?;
    Ok(Json(
        state
            .orders
            .add_cost(id, amount, req.description)
            .await?
            .into(),
    ))
}

/// DELETE /orders/{id}/costs/{cost_id}
#[tracing::instrument(skip(state))]
pub async fn remove_cost<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, cost_id)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let cost_id: AdditionalCostId = parse_id(&cost_id)?;
    Ok(Json(state.orders.remove_cost(id, cost_id).await?.into()))
}

/// POST /orders/{id}/confirm
#[tracing::instrument(skip(state))]
pub async fn confirm<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.confirm(id).await?.into()))
}

/// POST /orders/{id}/payments
#[tracing::instrument(skip(state, req))]
pub async fn record_payment<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let amount = to_minor(req.amount)?;
    Ok(Json(state.orders.record_payment(id, amount).await?.into()))
}

/// PATCH /orders/{id}/materials: record the actual material usage.
#[tracing::instrument(skip(state, req))]
pub async fn adjust_material_usage<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AdjustUsageRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    let adjustments = req
        .usages
        .into_iter()
        .map(|u| {
            Ok(UsageAdjustment {
                usage_id: parse_id::<MaterialUsageId>(&u.usage_id)?,
                actual_usage: u.actual_usage,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    Ok(Json(
        state
            .orders
            .adjust_material_usage(id, adjustments)
            .await?
            .into(),
    ))
}

/// POST /orders/{id}/ready
#[tracing::instrument(skip(state))]
pub async fn mark_ready<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.mark_ready(id).await?.into()))
}

/// POST /orders/{id}/ship
#[tracing::instrument(skip(state))]
pub async fn mark_shipped<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.mark_shipped(id).await?.into()))
}

/// POST /orders/{id}/complete
#[tracing::instrument(skip(state))]
pub async fn complete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.complete(id).await?.into()))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.cancel(id).await?.into()))
}
