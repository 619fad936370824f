pub mod records;
pub mod schema;

pub use records::{AggregateRow, CuratedRecord, RejectReason, RowRejected, UNKNOWN};
pub use schema::{Layer, SchemaVersion, get_schema};
