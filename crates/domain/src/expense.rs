//! Workshop expenses: rent, tools, utilities and other money going out that
//! is not tied to an order.

use chrono::{DateTime, NaiveDate, Utc};
use common::{ExpenseId, Money};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::material::required_text;

/// One booked expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    /// Free-form category such as "rent" or "tools".
    pub expense_type: String,
    /// How often the expense recurs, e.g. "monthly" or "once".
    pub periodicity: String,
    pub description: Option<String>,
    pub amount: Money,
    /// Day the money was actually spent.
    pub actual_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Input for booking an expense.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewExpense {
    pub expense_type: String,
    pub periodicity: String,
    pub description: Option<String>,
    pub amount: Money,
    /// Defaults to today.
    pub actual_date: Option<NaiveDate>,
}

/// Partial update of an expense.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    pub expense_type: Option<String>,
    pub periodicity: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Money>,
    pub actual_date: Option<NaiveDate>,
}

impl ExpenseUpdate {
    pub fn is_empty(&self) -> bool {
        self.expense_type.is_none()
            && self.periodicity.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.actual_date.is_none()
    }
}

impl Expense {
    pub fn new(input: NewExpense) -> Result<Self> {
        let expense_type = required_text("expense_type", &input.expense_type)?;
        let periodicity = required_text("periodicity", &input.periodicity)?;
        validate_amount(input.amount)?;

        let created_at = Utc::now();
        Ok(Self {
            id: ExpenseId::new(),
            expense_type,
            periodicity,
            description: input.description,
            amount: input.amount,
            actual_date: input.actual_date.unwrap_or_else(|| created_at.date_naive()),
            created_at,
        })
    }

    /// Applies a partial update. Nothing changes when a field is invalid.
    pub fn apply_update(&mut self, update: ExpenseUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(DomainError::invalid_input("update", "no fields to update provided"));
        }
        let expense_type = update
            .expense_type
            .as_deref()
            .map(|t| required_text("expense_type", t))
            .transpose()?;
        let periodicity = update
            .periodicity
            .as_deref()
            .map(|p| required_text("periodicity", p))
            .transpose()?;
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
        }

        if let Some(expense_type) = expense_type {
            self.expense_type = expense_type;
        }
        if let Some(periodicity) = periodicity {
            self.periodicity = periodicity;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(amount) = update.amount {
            self.amount = amount;
        }
        if let Some(actual_date) = update.actual_date {
            self.actual_date = actual_date;
        }
        Ok(())
    }
}

fn validate_amount(amount: Money) -> Result<()> {
    if amount.is_negative() {
        return Err(DomainError::invalid_input("amount", "must not be negative"));
    }
    Ok(())
}
