//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Named pool registration and lookup
//! - Connection handles, row cursors and transactions
//! - Descriptor dispatch
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connection;
pub mod dispatch;
pub(crate) mod params;
pub mod pool;
pub mod registry;
pub mod rows;
pub mod types;

pub use connection::{Connection, ExecResult, Transaction};
pub use dispatch::{Outcome, Payload, dispatch};
pub use pool::{DbPool, PoolStats};
pub use registry::ConnectionRegistry;
pub use rows::{Row, Rows};
