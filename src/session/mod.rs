//! Datastore collaborator contracts.
//!
//! The mapping layer never talks to a storage engine directly; it consumes
//! the narrow session/property-manager contract defined here. Backends
//! implement these traits; [`memory`] ships an in-memory reference backend
//! used by tests and prototyping.

pub mod memory;

use std::collections::BTreeSet;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::schema::{Label, PropertyDescriptor, RelationDescriptor, TypeDescriptorSet};
use crate::value::Value;

/// Backend-assigned record identity, stable across the record's lifetime
/// (including migration).
pub type RecordId = u64;

/// Backend-assigned relation identity.
pub type RelationId = u64;

/// Opaque handle to a datastore entity. The record itself is owned by the
/// datastore; the mapping layer holds only this reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Record {
    id: RecordId,
}

impl Record {
    /// Creates a handle for the given backend id.
    pub fn new(id: RecordId) -> Self {
        Self { id }
    }

    /// The backend-assigned id.
    pub fn id(&self) -> RecordId {
        self.id
    }
}

/// Opaque handle to a datastore relation (edge).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    id: RelationId,
}

impl Relation {
    /// Creates a handle for the given backend id.
    pub fn new(id: RelationId) -> Self {
        Self { id }
    }

    /// The backend-assigned id.
    pub fn id(&self) -> RelationId {
        self.id
    }
}

/// A raw value crossing the session boundary: either a scalar or a record
/// reference.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    /// Scalar payload.
    Scalar(Value),
    /// Reference to a datastore record.
    Record(Record),
}

/// One raw result row: ordered column name/value pairs.
pub type RawRow = Vec<(String, RawValue)>;

/// Named query parameters as passed to the backend.
pub type QueryParams = FxHashMap<String, RawValue>;

/// The transaction contract of the underlying datastore.
pub trait DatastoreTransaction {
    /// Opens the datastore transaction.
    fn begin(&self) -> Result<()>;
    /// Makes all staged record-level state durable.
    fn commit(&self) -> Result<()>;
    /// Discards all staged record-level state.
    fn rollback(&self) -> Result<()>;
    /// Whether a datastore transaction is currently open.
    fn is_active(&self) -> bool;
}

/// A connection to the underlying datastore.
///
/// One session backs one manager; sessions are thread-confined and all
/// blocking I/O happens behind this contract.
pub trait DatastoreSession {
    /// The datastore transaction associated with this session.
    fn transaction(&self) -> Rc<dyn DatastoreTransaction>;

    /// Whether the given raw value is an entity reference.
    fn is_entity(&self, value: &RawValue) -> bool {
        matches!(value, RawValue::Record(_))
    }

    /// The id of a record.
    fn record_id(&self, record: &Record) -> RecordId {
        record.id()
    }

    /// The discriminator set currently attached to a record.
    fn discriminators(&self, record: &Record) -> Result<BTreeSet<Label>>;

    /// Creates a new record for the given types carrying the given
    /// discriminators.
    fn create(
        &self,
        types: &TypeDescriptorSet,
        discriminators: &BTreeSet<Label>,
    ) -> Result<Record>;

    /// Deletes a record.
    fn delete(&self, record: &Record) -> Result<()>;

    /// Finds records carrying `label` whose `property` equals `value`,
    /// e.g. via a backend index.
    fn find(&self, label: &Label, property: &str, value: &Value) -> Result<Vec<Record>>;

    /// Executes a statement in the backend's query language.
    fn execute(&self, statement: &str, parameters: &QueryParams) -> Result<Vec<RawRow>>;

    /// Applies a discriminator delta to a record: labels in `old` but not
    /// in `new` are removed, labels in `new` but not in `old` are added,
    /// labels in both are left untouched.
    fn migrate(
        &self,
        record: &Record,
        old: &BTreeSet<Label>,
        new: &BTreeSet<Label>,
    ) -> Result<()>;

    /// Flushes pending changes for a record to the datastore.
    fn flush(&self, record: &Record) -> Result<()>;

    /// The property manager associated with this session.
    fn property_manager(&self) -> &dyn PropertyManager;
}

/// Get/set contract for record properties and relations, reached through
/// the session.
pub trait PropertyManager {
    /// Reads a primitive property; `Value::Null` if unset.
    fn get_property(&self, record: &Record, property: &PropertyDescriptor) -> Result<Value>;

    /// Writes a primitive property.
    fn set_property(
        &self,
        record: &Record,
        property: &PropertyDescriptor,
        value: Value,
    ) -> Result<()>;

    /// Whether a primitive property is set.
    fn has_property(&self, record: &Record, property: &PropertyDescriptor) -> Result<bool>;

    /// Removes a primitive property.
    fn remove_property(&self, record: &Record, property: &PropertyDescriptor) -> Result<()>;

    /// Reads an enum property as its variant name; `None` if unset.
    fn get_enum_property(
        &self,
        record: &Record,
        property: &PropertyDescriptor,
    ) -> Result<Option<String>>;

    /// Writes an enum property by variant name.
    fn set_enum_property(
        &self,
        record: &Record,
        property: &PropertyDescriptor,
        variant: &str,
    ) -> Result<()>;

    /// Whether a single-valued relation exists.
    fn has_single_relation(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
    ) -> Result<bool>;

    /// Reads a single-valued relation.
    fn single_relation(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
    ) -> Result<Option<Relation>>;

    /// Reads all relations for a collection accessor.
    fn relations(&self, record: &Record, relation: &RelationDescriptor)
        -> Result<Vec<Relation>>;

    /// Creates a relation between two records, oriented by the
    /// descriptor's direction.
    fn create_relation(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
        target: &Record,
    ) -> Result<Relation>;

    /// Deletes a relation.
    fn delete_relation(&self, relation: &Relation) -> Result<()>;

    /// The source record of a relation.
    fn relation_source(&self, relation: &Relation) -> Result<Record>;

    /// The target record of a relation.
    fn relation_target(&self, relation: &Relation) -> Result<Record>;
}
