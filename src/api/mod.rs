//! Purpose: Define the stable public Rust API boundary for Quantlink.
//! Exports: Provider lifecycle, query operations, and decoded result types.
//! Role: Public, additive-only surface over the `core` modules.
//! Invariants: This module is the stable path to the native bridge; `core`
//! items may change shape between releases.
//! Invariants: Nothing exported here carries a foreign pointer.

pub use crate::core::cancel::{CancelToken, WaitOutcome};
pub use crate::core::config::Config;
pub use crate::core::data::{DataSet, Row, Rows, Table, ZERO_DATE};
pub use crate::core::error::{DimMismatch, Error, ErrorKind};
pub use crate::core::options::{OptionString, QueryOptions};
pub use crate::core::provider::{CfnMode, MAX_INDICATOR_COUNT, Provider, unload};
pub use crate::core::value::{Value, ValueKind};
