//! # Repository Module
//!
//! Database repository implementations for Till POS.
//!
//! ## Repository Pattern
//! Each repository wraps the pool and isolates the SQL for one aggregate:
//!
//! - [`session::SessionRepository`] - session snapshots and guarded
//!   status transitions
//! - [`stock::StockRepository`] - the inventory hold ledger
//! - [`transaction::TransactionRepository`] - immutable sale records
//! - [`product::ProductRepository`] - catalog read side (barcode/search)
//! - [`customer::CustomerRepository`] - persisted customers
//!
//! Queries use sqlx's runtime-checked `query`/`query_as` forms with
//! `FromRow` derives on the row types.

pub mod customer;
pub mod product;
pub mod session;
pub mod stock;
pub mod transaction;
