//! Query execution and row mapping.

mod executor;
mod result;

pub use executor::{Query, QueryExpression};
pub use result::{CompositeRow, InstanceResult, RowResult, RowValue};
