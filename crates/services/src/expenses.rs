//! Workshop expenses bookkeeping.

use common::ExpenseId;
use domain::{DomainError, Expense, ExpenseUpdate, NewExpense};
use store::{ExpenseFilter, ExpenseListing, Page, Store};

use crate::error::Result;
use crate::telemetry;

/// Service for expenses booked outside of orders.
pub struct ExpenseService<S: Store> {
    store: S,
}

impl<S: Store> ExpenseService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: NewExpense) -> Result<Expense> {
        let expense = Expense::new(input)?;
        self.store.insert_expense(&expense).await?;

        telemetry::record_expense();
        tracing::info!(
            expense_id = %expense.id,
            expense_type = %expense.expense_type,
            amount = expense.amount.minor(),
            "expense recorded"
        );
        Ok(expense)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: ExpenseId) -> Result<Expense> {
        self.store
            .get_expense(id)
            .await?
            .ok_or_else(|| DomainError::not_found("expense", id).into())
    }

    /// Lists expenses by `actual_date` together with the amount summed over
    /// every match, not just the page.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &ExpenseFilter, page: Page) -> Result<ExpenseListing> {
        Ok(self.store.list_expenses(filter, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: ExpenseId, update: ExpenseUpdate) -> Result<Expense> {
        let expense = self.store.update_expense(id, update).await?;
        tracing::info!(expense_id = %id, "expense updated");
        Ok(expense)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ExpenseId) -> Result<()> {
        self.store.delete_expense(id).await?;
        tracing::info!(expense_id = %id, "expense deleted");
        Ok(())
    }
}
