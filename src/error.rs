//! Error types shared across the mapping layer.

use thiserror::Error;

use crate::session::RecordId;
use crate::validation::ConstraintViolation;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Errors raised by the mapping layer.
///
/// All variants are surfaced to the caller unmodified; nothing is retried
/// internally. The only local recovery path is a validation failure during
/// commit, which rolls the datastore transaction back before the error is
/// raised.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// A declared type is not present in the registry.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// The same type name was declared more than once.
    #[error("type '{0}' is declared more than once")]
    DuplicateType(String),
    /// The declared schema is inconsistent (conflicting accessors,
    /// inheritance cycles, duplicate indexed properties).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// An accessor on a composite instance has no backing descriptor.
    #[error("no accessor '{accessor}' is mapped on this instance")]
    UnmappedOperation {
        /// The accessor name that could not be dispatched.
        accessor: String,
    },
    /// Use of an instance after deletion or migration.
    #[error("instance for record {0} has been destroyed")]
    InstanceDestroyed(RecordId),
    /// Commit was blocked by outstanding constraint violations. The
    /// datastore transaction has already been rolled back.
    #[error("validation failed with {} violation(s)", .violations.len())]
    ValidationFailed {
        /// The full violation set collected over the instance cache.
        violations: Vec<ConstraintViolation>,
    },
    /// A single-result query returned no rows.
    #[error("query returned no rows")]
    NoResult,
    /// A single-result query returned more than one row.
    #[error("query returned {rows} rows where exactly one was expected")]
    AmbiguousResult {
        /// Number of rows actually returned.
        rows: usize,
    },
    /// A row column lookup used a name the result does not contain.
    /// Column names are case sensitive; the available names are listed to
    /// make a case mismatch visible.
    #[error("unknown column '{column}' (columns: {})", .available.join(", "))]
    UnknownColumn {
        /// The requested column name.
        column: String,
        /// The column names the row actually carries.
        available: Vec<String>,
    },
    /// A single-column accessor was used on a row with several columns.
    #[error("row has {0} columns where exactly one was expected")]
    AmbiguousColumn(usize),
    /// `find` was invoked against a type with no indexed property.
    #[error("type '{0}' has no indexed property")]
    MissingIndexedProperty(String),
    /// `find` was invoked against a type with no label.
    #[error("type '{0}' has no label")]
    MissingLabel(String),
    /// `begin` was called while a transaction is already active.
    #[error("transaction is already active")]
    TransactionActive,
    /// A data operation was attempted outside an active transaction.
    #[error("no active transaction")]
    TransactionNotActive,
    /// The owning manager was dropped while instance handles were still
    /// alive.
    #[error("session has been closed")]
    SessionClosed,
    /// The datastore has no record with the given id.
    #[error("record {0} not found")]
    RecordNotFound(RecordId),
    /// A property write did not match the declared value kind.
    #[error("property '{property}' expects a {expected} value, got {actual}")]
    ValueKindMismatch {
        /// The property accessor name.
        property: String,
        /// The kind declared in the schema.
        expected: &'static str,
        /// The kind of the supplied value.
        actual: &'static str,
    },
    /// An enum property write used an undeclared variant.
    #[error("enum property '{property}' has no variant '{variant}'")]
    UnknownEnumVariant {
        /// The property accessor name.
        property: String,
        /// The rejected variant name.
        variant: String,
    },
    /// A collection accessor was used on a single-valued relation.
    #[error("relation '{0}' is single-valued")]
    SingleValuedRelation(String),
    /// A single-value accessor was used on a collection relation.
    #[error("relation '{0}' is collection-valued")]
    CollectionValuedRelation(String),
    /// A single-valued relation holds more than one edge in the datastore.
    #[error("relation '{0}' has more than one edge")]
    AmbiguousRelation(String),
    /// A cast to a type the instance is not composed of.
    #[error("instance is not composed of type '{0}'")]
    NotComposedOf(String),
    /// No query with the given name is registered in the schema.
    #[error("no query named '{0}' is registered")]
    UnknownQuery(String),
    /// The datastore backend cannot execute the given statement.
    #[error("no handler registered for query '{0}'")]
    UnsupportedQuery(String),
}
