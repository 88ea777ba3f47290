//! Expense endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::{ExpenseId, to_major, to_minor};
use domain::{Expense, ExpenseUpdate, NewExpense};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{ExpenseFilter, SortOrder, Store};

use super::{page, parse_id};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateExpenseRequest {
    pub expense_type: String,
    pub periodicity: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub actual_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct UpdateExpenseRequest {
    pub expense_type: Option<String>,
    pub periodicity: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub actual_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub expense_type: Option<String>,
    pub periodicity: Option<String>,
    pub order: Option<SortOrder>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ExpenseResponse {
    pub id: String,
    pub expense_type: String,
    pub periodicity: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub actual_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<Expense> for ExpenseResponse {
    fn from(e: Expense) -> Self {
        Self {
            id: e.id.to_string(),
            expense_type: e.expense_type,
            periodicity: e.periodicity,
            description: e.description,
            amount: to_major(e.amount),
            actual_date: e.actual_date,
            created_at: e.created_at,
        }
    }
}

/// One page of expenses; `amount_total` covers every match.
#[derive(Serialize)]
pub struct ExpenseListResponse {
    pub items: Vec<ExpenseResponse>,
    pub total: usize,
    pub amount_total: Decimal,
}

// -- Handlers --

/// POST /expenses
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<ExpenseResponse>), ApiError> {
    let expense = state
        .expenses
        .create(NewExpense {
            expense_type: req.expense_type,
            periodicity: req.periodicity,
            description: req.description,
            amount: to_minor(req.amount)?,
            actual_date: req.actual_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(expense.into())))
}

/// GET /expenses
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ExpenseQuery>,
) -> Result<Json<ExpenseListResponse>, ApiError> {
    let filter = ExpenseFilter {
        date_from: query.date_from,
        date_to: query.date_to,
        expense_type: query.expense_type,
        periodicity: query.periodicity,
        order: query.order.unwrap_or_default(),
    };
    let listing = state
        .expenses
        .list(&filter, page(query.skip, query.limit))
        .await?;
    Ok(Json(ExpenseListResponse {
        items: listing.expenses.items.into_iter().map(Into::into).collect(),
        total: listing.expenses.total,
        amount_total: to_major(listing.amount_total),
    }))
}

/// GET /expenses/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    let id: ExpenseId = parse_id(&id)?;
    Ok(Json(state.expenses.get(id).await?.into()))
}

/// PATCH /expenses/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    let id: ExpenseId = parse_id(&id)?;
    let update = ExpenseUpdate {
        expense_type: req.expense_type,
        periodicity: req.periodicity,
        description: req.description,
        amount: req.amount.map(to_minor).transpose()?,
        actual_date: req.actual_date,
    };
    Ok(Json(state.expenses.update(id, update).await?.into()))
}

/// DELETE /expenses/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ExpenseId = parse_id(&id)?;
    state.expenses.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
