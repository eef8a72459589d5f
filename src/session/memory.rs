//! In-memory reference backend.
//!
//! Implements the session contract against a shared in-process store, for
//! tests and prototyping. Transactions are snapshot-based: `begin` clones
//! the base state, writes go to the working copy, `commit` publishes it and
//! `rollback` drops it. Query-language execution is out of scope for this
//! backend; statements resolve against handlers registered on the store.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Result, TesseraError};
use crate::schema::{
    Direction, Label, PropertyDescriptor, RelationDescriptor, TypeDescriptorSet,
};
use crate::session::{
    DatastoreSession, DatastoreTransaction, PropertyManager, QueryParams, RawRow, Record,
    RecordId, Relation, RelationId,
};
use crate::value::Value;

#[derive(Clone, Debug, Default)]
struct RecordData {
    labels: BTreeSet<Label>,
    properties: BTreeMap<String, Value>,
}

#[derive(Clone, Debug)]
struct RelationData {
    source: RecordId,
    target: RecordId,
    type_name: String,
}

/// Snapshot of the store contents, visible to query handlers.
#[derive(Clone, Debug, Default)]
pub struct StoreState {
    next_record: RecordId,
    next_relation: RelationId,
    records: BTreeMap<RecordId, RecordData>,
    relations: BTreeMap<RelationId, RelationData>,
}

impl StoreState {
    fn record(&self, id: RecordId) -> Result<&RecordData> {
        self.records.get(&id).ok_or(TesseraError::RecordNotFound(id))
    }

    fn record_mut(&mut self, id: RecordId) -> Result<&mut RecordData> {
        self.records
            .get_mut(&id)
            .ok_or(TesseraError::RecordNotFound(id))
    }

    /// Ids of all records, ascending.
    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.keys().copied()
    }

    /// The discriminator set of a record, if it exists.
    pub fn labels(&self, id: RecordId) -> Option<&BTreeSet<Label>> {
        self.records.get(&id).map(|r| &r.labels)
    }

    /// A property value of a record, if set.
    pub fn property(&self, id: RecordId, name: &str) -> Option<&Value> {
        self.records.get(&id).and_then(|r| r.properties.get(name))
    }

    /// Ids of all records carrying the given label, ascending.
    pub fn records_with_label(&self, label: &str) -> Vec<RecordId> {
        self.records
            .iter()
            .filter(|(_, data)| data.labels.contains(label))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Handler executing one registered statement against a store snapshot.
pub type QueryHandler = Arc<dyn Fn(&StoreState, &QueryParams) -> Result<Vec<RawRow>> + Send + Sync>;

/// Shared in-memory store. Cloning shares the underlying state; one store
/// can back any number of sessions (one per unit of work).
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    queries: Arc<RwLock<FxHashMap<String, QueryHandler>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let mut state = StoreState::default();
        state.next_record = 1;
        state.next_relation = 1;
        Self {
            state: Arc::new(RwLock::new(state)),
            queries: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Registers a handler for a statement. Sessions resolve `execute`
    /// calls by exact statement text.
    pub fn register_query<F>(&self, statement: impl Into<String>, handler: F)
    where
        F: Fn(&StoreState, &QueryParams) -> Result<Vec<RawRow>> + Send + Sync + 'static,
    {
        self.queries
            .write()
            .insert(statement.into(), Arc::new(handler));
    }

    /// Opens a session against this store.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            tx: Rc::new(MemoryTransaction {
                base: Arc::clone(&self.state),
                working: RefCell::new(None),
            }),
        }
    }
}

/// Snapshot transaction over the shared base state.
pub struct MemoryTransaction {
    base: Arc<RwLock<StoreState>>,
    working: RefCell<Option<StoreState>>,
}

impl DatastoreTransaction for MemoryTransaction {
    fn begin(&self) -> Result<()> {
        let mut working = self.working.borrow_mut();
        if working.is_some() {
            return Err(TesseraError::TransactionActive);
        }
        *working = Some(self.base.read().clone());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        match self.working.borrow_mut().take() {
            Some(state) => {
                *self.base.write() = state;
                Ok(())
            }
            None => Err(TesseraError::TransactionNotActive),
        }
    }

    fn rollback(&self) -> Result<()> {
        match self.working.borrow_mut().take() {
            Some(_) => Ok(()),
            None => Err(TesseraError::TransactionNotActive),
        }
    }

    fn is_active(&self) -> bool {
        self.working.borrow().is_some()
    }
}

/// One unit-of-work connection to a [`MemoryStore`].
pub struct MemorySession {
    store: MemoryStore,
    tx: Rc<MemoryTransaction>,
}

impl MemorySession {
    fn with_state<R>(&self, f: impl FnOnce(&StoreState) -> Result<R>) -> Result<R> {
        let working = self.tx.working.borrow();
        match working.as_ref() {
            Some(state) => f(state),
            None => f(&self.store.state.read()),
        }
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut StoreState) -> Result<R>) -> Result<R> {
        let mut working = self.tx.working.borrow_mut();
        match working.as_mut() {
            Some(state) => f(state),
            None => Err(TesseraError::TransactionNotActive),
        }
    }

    fn relations_of(&self, record: &Record, relation: &RelationDescriptor) -> Result<Vec<Relation>> {
        self.with_state(|state| {
            state.record(record.id())?;
            Ok(state
                .relations
                .iter()
                .filter(|(_, data)| data.type_name == relation.relation_type)
                .filter(|(_, data)| match relation.direction {
                    Direction::Outgoing => data.source == record.id(),
                    Direction::Incoming => data.target == record.id(),
                })
                .map(|(id, _)| Relation::new(*id))
                .collect())
        })
    }
}

impl DatastoreSession for MemorySession {
    fn transaction(&self) -> Rc<dyn DatastoreTransaction> {
        Rc::clone(&self.tx) as Rc<dyn DatastoreTransaction>
    }

    fn discriminators(&self, record: &Record) -> Result<BTreeSet<Label>> {
        self.with_state(|state| Ok(state.record(record.id())?.labels.clone()))
    }

    fn create(
        &self,
        _types: &TypeDescriptorSet,
        discriminators: &BTreeSet<Label>,
    ) -> Result<Record> {
        self.with_state_mut(|state| {
            let id = state.next_record;
            state.next_record += 1;
            state.records.insert(
                id,
                RecordData {
                    labels: discriminators.clone(),
                    properties: BTreeMap::new(),
                },
            );
            Ok(Record::new(id))
        })
    }

    fn delete(&self, record: &Record) -> Result<()> {
        self.with_state_mut(|state| {
            let id = record.id();
            state
                .records
                .remove(&id)
                .ok_or(TesseraError::RecordNotFound(id))?;
            state
                .relations
                .retain(|_, data| data.source != id && data.target != id);
            Ok(())
        })
    }

    fn find(&self, label: &Label, property: &str, value: &Value) -> Result<Vec<Record>> {
        self.with_state(|state| {
            Ok(state
                .records
                .iter()
                .filter(|(_, data)| data.labels.contains(label))
                .filter(|(_, data)| data.properties.get(property) == Some(value))
                .map(|(id, _)| Record::new(*id))
                .collect())
        })
    }

    fn execute(&self, statement: &str, parameters: &QueryParams) -> Result<Vec<RawRow>> {
        let handler = self
            .store
            .queries
            .read()
            .get(statement)
            .cloned()
            .ok_or_else(|| TesseraError::UnsupportedQuery(statement.to_owned()))?;
        self.with_state(|state| handler.as_ref()(state, parameters))
    }

    fn migrate(
        &self,
        record: &Record,
        old: &BTreeSet<Label>,
        new: &BTreeSet<Label>,
    ) -> Result<()> {
        self.with_state_mut(|state| {
            let data = state.record_mut(record.id())?;
            for label in old.difference(new) {
                data.labels.remove(label);
            }
            for label in new.difference(old) {
                data.labels.insert(label.clone());
            }
            Ok(())
        })
    }

    fn flush(&self, record: &Record) -> Result<()> {
        self.with_state(|state| {
            state.record(record.id())?;
            Ok(())
        })
    }

    fn property_manager(&self) -> &dyn PropertyManager {
        self
    }
}

impl PropertyManager for MemorySession {
    fn get_property(&self, record: &Record, property: &PropertyDescriptor) -> Result<Value> {
        self.with_state(|state| {
            Ok(state
                .record(record.id())?
                .properties
                .get(&property.name)
                .cloned()
                .unwrap_or(Value::Null))
        })
    }

    fn set_property(
        &self,
        record: &Record,
        property: &PropertyDescriptor,
        value: Value,
    ) -> Result<()> {
        self.with_state_mut(|state| {
            let data = state.record_mut(record.id())?;
            if value.is_null() {
                data.properties.remove(&property.name);
            } else {
                data.properties.insert(property.name.clone(), value);
            }
            Ok(())
        })
    }

    fn has_property(&self, record: &Record, property: &PropertyDescriptor) -> Result<bool> {
        self.with_state(|state| {
            Ok(state
                .record(record.id())?
                .properties
                .contains_key(&property.name))
        })
    }

    fn remove_property(&self, record: &Record, property: &PropertyDescriptor) -> Result<()> {
        self.with_state_mut(|state| {
            state
                .record_mut(record.id())?
                .properties
                .remove(&property.name);
            Ok(())
        })
    }

    fn get_enum_property(
        &self,
        record: &Record,
        property: &PropertyDescriptor,
    ) -> Result<Option<String>> {
        Ok(self
            .get_property(record, property)?
            .as_str()
            .map(str::to_owned))
    }

    fn set_enum_property(
        &self,
        record: &Record,
        property: &PropertyDescriptor,
        variant: &str,
    ) -> Result<()> {
        self.set_property(record, property, Value::String(variant.to_owned()))
    }

    fn has_single_relation(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
    ) -> Result<bool> {
        Ok(self.single_relation(record, relation)?.is_some())
    }

    fn single_relation(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
    ) -> Result<Option<Relation>> {
        let mut relations = self.relations_of(record, relation)?;
        match relations.len() {
            0 => Ok(None),
            1 => Ok(Some(relations.remove(0))),
            _ => Err(TesseraError::AmbiguousRelation(relation.name.clone())),
        }
    }

    fn relations(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
    ) -> Result<Vec<Relation>> {
        self.relations_of(record, relation)
    }

    fn create_relation(
        &self,
        record: &Record,
        relation: &RelationDescriptor,
        target: &Record,
    ) -> Result<Relation> {
        let (source_id, target_id) = match relation.direction {
            Direction::Outgoing => (record.id(), target.id()),
            Direction::Incoming => (target.id(), record.id()),
        };
        self.with_state_mut(|state| {
            state.record(source_id)?;
            state.record(target_id)?;
            let id = state.next_relation;
            state.next_relation += 1;
            state.relations.insert(
                id,
                RelationData {
                    source: source_id,
                    target: target_id,
                    type_name: relation.relation_type.clone(),
                },
            );
            Ok(Relation::new(id))
        })
    }

    fn delete_relation(&self, relation: &Relation) -> Result<()> {
        self.with_state_mut(|state| {
            state.relations.remove(&relation.id());
            Ok(())
        })
    }

    fn relation_source(&self, relation: &Relation) -> Result<Record> {
        self.with_state(|state| {
            state
                .relations
                .get(&relation.id())
                .map(|data| Record::new(data.source))
                .ok_or(TesseraError::RecordNotFound(relation.id()))
        })
    }

    fn relation_target(&self, relation: &Relation) -> Result<Record> {
        self.with_state(|state| {
            state
                .relations
                .get(&relation.id())
                .map(|data| Record::new(data.target))
                .ok_or(TesseraError::RecordNotFound(relation.id()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, Schema, TypeRegistry};

    fn empty_types() -> TypeDescriptorSet {
        let registry = TypeRegistry::new(Schema::default()).expect("registry");
        registry.types_for(&BTreeSet::new())
    }

    fn labels(names: &[&str]) -> BTreeSet<Label> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn commit_publishes_working_state() {
        let store = MemoryStore::new();
        let session = store.session();
        let tx = session.transaction();

        tx.begin().expect("begin");
        let record = session
            .create(&empty_types(), &labels(&["Person"]))
            .expect("create");
        tx.commit().expect("commit");

        let other = store.session();
        let discriminators = other.discriminators(&record).expect("discriminators");
        assert!(discriminators.contains("Person"));
    }

    #[test]
    fn rollback_discards_working_state() {
        let store = MemoryStore::new();
        let session = store.session();
        let tx = session.transaction();

        tx.begin().expect("begin");
        let record = session
            .create(&empty_types(), &labels(&["Person"]))
            .expect("create");
        tx.rollback().expect("rollback");

        let other = store.session();
        assert!(matches!(
            other.discriminators(&record),
            Err(TesseraError::RecordNotFound(_))
        ));
    }

    #[test]
    fn writes_require_active_transaction() {
        let store = MemoryStore::new();
        let session = store.session();
        assert!(matches!(
            session.create(&empty_types(), &labels(&["Person"])),
            Err(TesseraError::TransactionNotActive)
        ));
    }

    #[test]
    fn find_matches_label_and_property() {
        let store = MemoryStore::new();
        let session = store.session();
        let tx = session.transaction();
        let name = PropertyDescriptor::new("name", crate::schema::PropertyKind::String);

        tx.begin().expect("begin");
        let peter = session
            .create(&empty_types(), &labels(&["Person"]))
            .expect("create");
        session
            .set_property(&peter, &name, Value::from("Peter"))
            .expect("set");
        let group = session
            .create(&empty_types(), &labels(&["Group"]))
            .expect("create");
        session
            .set_property(&group, &name, Value::from("Peter"))
            .expect("set");

        let found = session
            .find(&"Person".to_owned(), "name", &Value::from("Peter"))
            .expect("find");
        assert_eq!(found, vec![peter]);
        tx.commit().expect("commit");
    }

    #[test]
    fn relation_orientation_follows_direction() {
        let store = MemoryStore::new();
        let session = store.session();
        let tx = session.transaction();
        let outgoing = RelationDescriptor::new(
            "members",
            "MEMBER",
            Direction::Outgoing,
            Cardinality::Many,
        );
        let incoming = RelationDescriptor::new(
            "groups",
            "MEMBER",
            Direction::Incoming,
            Cardinality::Many,
        );

        tx.begin().expect("begin");
        let group = session
            .create(&empty_types(), &labels(&["Group"]))
            .expect("create");
        let person = session
            .create(&empty_types(), &labels(&["Person"]))
            .expect("create");
        let relation = session
            .create_relation(&group, &outgoing, &person)
            .expect("relate");
        assert_eq!(session.relation_source(&relation).expect("source"), group);
        assert_eq!(session.relation_target(&relation).expect("target"), person);

        // The same edge is visible from the person through the incoming accessor.
        let seen = session.relations(&person, &incoming).expect("relations");
        assert_eq!(seen, vec![relation]);
        tx.commit().expect("commit");
    }

    #[test]
    fn unregistered_statement_is_rejected() {
        let store = MemoryStore::new();
        let session = store.session();
        assert!(matches!(
            session.execute("match anything", &QueryParams::default()),
            Err(TesseraError::UnsupportedQuery(_))
        ));
    }
}
