//! SQLite persistence adapters using Diesel ORM.
//!
//! The warehouse database holds the materialized canonical table, its
//! publication log, and the structured activity details.
//!
//! - **Thin adapters**: repositories only translate between Diesel rows and
//!   domain records.
//! - **Internal models**: `models.rs` and `schema.rs` never leave this module.
//! - **One connection**: SQLite serializes writers, so the repositories share
//!   a [`Warehouse`] connection instead of a pool.
//!
//! # Example
//!
//! ```ignore
//! use ledger::outbound::persistence::{DieselAnalyticStore, Warehouse};
//!
//! let warehouse = Warehouse::open("data/warehouse.sqlite3").await?;
//! let store = DieselAnalyticStore::new(warehouse.clone());
//! ```

mod database;
mod diesel_analytic_store;
mod diesel_detail_repository;
pub(crate) mod diesel_helpers;
mod models;
mod schema;

pub use database::{DatabaseError, Warehouse};
pub use diesel_analytic_store::DieselAnalyticStore;
pub use diesel_detail_repository::DieselDetailRepository;
