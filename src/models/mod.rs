//! Data models for dbkit.
//!
//! Everything in this module is pure data: values, column maps, operation
//! descriptors and the statements built from them. Nothing here performs I/O.

pub mod connection;
pub mod descriptor;
pub mod key_value;
pub mod statement;
pub mod value;

pub use connection::{DatabaseType, PoolConfig};
pub use descriptor::{Descriptor, Operation, Query};
pub use key_value::{ColumnSplit, Fields, KeyValue};
pub use statement::Statement;
pub use value::Value;
