//! List filters, sorting and paging.

use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, Money};
use domain::{Expense, OrderStatus};
use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_LIMIT: usize = 12;

/// Largest accepted page size.
pub const MAX_LIMIT: usize = 1000;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Applies the direction to an ascending comparison.
    pub fn apply(&self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// A window into a sorted listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Creates a page, clamping the limit to `1..=MAX_LIMIT`.
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: limit.clamp(1, MAX_LIMIT),
        }
    }

    /// Cuts the page out of an already sorted list.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

/// One page of results and the number of matches across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialSort {
    #[default]
    Name,
    MaterialType,
    CountLeft,
    Price,
}

impl MaterialSort {
    pub fn column(&self) -> &'static str {
        match self {
            MaterialSort::Name => "name",
            MaterialSort::MaterialType => "material_type",
            MaterialSort::CountLeft => "count_left",
            MaterialSort::Price => "pack_price",
        }
    }
}

/// Filter for material listings.
#[derive(Debug, Clone, Default)]
pub struct MaterialFilter {
    /// Exact material type.
    pub material_type: Option<String>,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
    pub sort_by: MaterialSort,
    pub order: SortOrder,
}

impl MaterialFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn material_type(mut self, material_type: impl Into<String>) -> Self {
        self.material_type = Some(material_type.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn sort_by(mut self, sort_by: MaterialSort, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Name,
    Size,
}

impl ProductSort {
    pub fn column(&self) -> &'static str {
        match self {
            ProductSort::Name => "name",
            ProductSort::Size => "size",
        }
    }
}

/// Filter for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Exact product name.
    pub name: Option<String>,
    /// Case-insensitive substring of the name or size.
    pub search: Option<String>,
    pub sort_by: ProductSort,
    pub order: SortOrder,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    CreatedAt,
    TotalPrice,
    Status,
}

impl OrderSort {
    pub fn column(&self) -> &'static str {
        match self {
            OrderSort::CreatedAt => "created_at",
            OrderSort::TotalPrice => "total_price",
            OrderSort::Status => "status",
        }
    }
}

/// Filter for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Created at or after this instant.
    pub created_from: Option<DateTime<Utc>>,
    /// Created at or before this instant.
    pub created_to: Option<DateTime<Utc>>,
    pub customer: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub status: Option<OrderStatus>,
    pub sort_by: OrderSort,
    pub order: SortOrder,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }
}

/// Filter for expense listings. Expenses are always ordered by
/// `actual_date`.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    /// Spent on or after this day.
    pub date_from: Option<NaiveDate>,
    /// Spent on or before this day.
    pub date_to: Option<NaiveDate>,
    pub expense_type: Option<String>,
    pub periodicity: Option<String>,
    pub order: SortOrder,
}

impl ExpenseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn expense_type(mut self, expense_type: impl Into<String>) -> Self {
        self.expense_type = Some(expense_type.into());
        self
    }

    pub fn periodicity(mut self, periodicity: impl Into<String>) -> Self {
        self.periodicity = Some(periodicity.into());
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub(crate) fn matches(&self, expense: &Expense) -> bool {
        self.date_from.is_none_or(|from| expense.actual_date >= from)
            && self.date_to.is_none_or(|to| expense.actual_date <= to)
            && self
                .expense_type
                .as_ref()
                .is_none_or(|t| &expense.expense_type == t)
            && self
                .periodicity
                .as_ref()
                .is_none_or(|p| &expense.periodicity == p)
    }
}

/// One page of expenses and the amount summed over every match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseListing {
    pub expenses: Listing<Expense>,
    pub amount_total: Money,
}

/// Case-insensitive substring match used by the in-memory store.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps_limit() {
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(0, 5000).limit, MAX_LIMIT);
        assert_eq!(Page::default().limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_page_slice() {
        let page = Page::new(2, 3);
        assert_eq!(page.slice((0..10).collect()), vec![2, 3, 4]);
        assert!(Page::new(20, 3).slice((0..10).collect::<Vec<_>>()).is_empty());
    }

    #[test]
    fn test_sort_order_apply() {
        use std::cmp::Ordering;
        assert_eq!(SortOrder::Asc.apply(Ordering::Less), Ordering::Less);
        assert_eq!(SortOrder::Desc.apply(Ordering::Less), Ordering::Greater);
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Oak Board", "oak"));
        assert!(!contains_ignore_case("Oak Board", "pine"));
    }
}
