pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{
    ExpenseFilter, ExpenseListing, Listing, MaterialFilter, MaterialSort, OrderFilter, OrderSort,
    Page, ProductFilter, ProductSort, SortOrder,
};
pub use store::{CommitOptions, MaterialKey, ProductKey, Store};
