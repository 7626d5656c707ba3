//! Persistence for accounts, catalogs, customers and invoices.
//!
//! - `model`: rows to be inserted.
//! - `repo`: SQL-only functions mapping rows into domain types.
//! - `store`: [`SqliteStore`], the collaborator traits over a pool.

pub mod model;
pub mod repo;
pub mod store;

pub use model::{NewAccount, NewProduct};
pub use repo::*;
pub use store::SqliteStore;
