//! HTTP route handlers.

pub mod expenses;
pub mod health;
pub mod materials;
pub mod orders;
pub mod products;

use std::str::FromStr;

use serde::Serialize;
use store::{Listing, Page};

use crate::error::ApiError;

/// Builds a page from optional `skip` and `limit` query parameters.
pub(crate) fn page(skip: Option<usize>, limit: Option<usize>) -> Page {
    let default = Page::default();
    Page::new(skip.unwrap_or(default.skip), limit.unwrap_or(default.limit))
}

/// One page of a listing and the total number of matches.
#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn from_listing<U>(listing: Listing<U>, map: impl FnMut(U) -> T) -> Self {
        Self {
            items: listing.items.into_iter().map(map).collect(),
            total: listing.total,
        }
    }
}

/// Parses a path segment into a typed identifier.
pub(crate) fn parse_id<T>(id: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
