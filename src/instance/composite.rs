//! Composite instance handles.
//!
//! A [`CompositeInstance`] is the typed handle an application interacts
//! with: tagged data (a record reference plus a descriptor set) dispatched
//! through a generic accessor API. The accessor surface is the union of
//! every composed type's descriptors, stored exactly once per distinct
//! accessor; equality, hashing and the string representation are built-in
//! handlers defined by record identity.

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::{Result, TesseraError};
use crate::instance::manager::ManagerInner;
use crate::schema::{
    Cardinality, Direction, PropertyDescriptor, PropertyKind, RelationDescriptor,
    TypeDescriptorSet,
};
use crate::session::{Record, RecordId, Relation};
use crate::value::Value;

/// Accessor dispatch table: one entry per distinct property or relation
/// across the whole descriptor set.
pub(crate) struct DispatchTable {
    properties: FxHashMap<String, PropertyDescriptor>,
    relations: FxHashMap<String, RelationDescriptor>,
}

impl DispatchTable {
    /// Unions the descriptor lists of all member types, deduplicating equal
    /// descriptors by accessor name and rejecting conflicting ones.
    pub(crate) fn build(types: &TypeDescriptorSet) -> Result<Self> {
        let mut properties: FxHashMap<String, PropertyDescriptor> = FxHashMap::default();
        let mut relations: FxHashMap<String, RelationDescriptor> = FxHashMap::default();
        for metadata in types.iter() {
            for property in metadata.properties() {
                if relations.contains_key(&property.name) {
                    return Err(composition_conflict(&property.name));
                }
                match properties.get(&property.name) {
                    Some(existing) if existing.kind == property.kind => {}
                    Some(_) => return Err(composition_conflict(&property.name)),
                    None => {
                        properties.insert(property.name.clone(), property.clone());
                    }
                }
            }
            for relation in metadata.relations() {
                if properties.contains_key(&relation.name) {
                    return Err(composition_conflict(&relation.name));
                }
                match relations.get(&relation.name) {
                    Some(existing) if *existing == *relation => {}
                    Some(_) => return Err(composition_conflict(&relation.name)),
                    None => {
                        relations.insert(relation.name.clone(), relation.clone());
                    }
                }
            }
        }
        Ok(Self {
            properties,
            relations,
        })
    }

    fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }
}

fn composition_conflict(accessor: &str) -> TesseraError {
    TesseraError::InvalidSchema(format!(
        "accessor '{accessor}' is composed with conflicting descriptors"
    ))
}

struct InstanceInner {
    record: Record,
    types: TypeDescriptorSet,
    dispatch: DispatchTable,
    destroyed: Cell<bool>,
    manager: Weak<ManagerInner>,
}

/// The live, typed handle bound to exactly one record and one descriptor
/// set.
///
/// Handles are cheap to clone; all clones share identity. Within one
/// transaction scope the instance manager returns the same handle for the
/// same record, so reference identity ([`CompositeInstance::ptr_eq`]) holds
/// in addition to the record-identity equality implemented by `PartialEq`.
///
/// A handle held past the end of its transaction is stale; using it is a
/// caller error. Handles are destroyed explicitly on delete and migration,
/// after which every accessor fails with
/// [`TesseraError::InstanceDestroyed`].
#[derive(Clone)]
pub struct CompositeInstance {
    inner: Rc<InstanceInner>,
}

impl CompositeInstance {
    pub(crate) fn new(
        record: Record,
        types: TypeDescriptorSet,
        dispatch: DispatchTable,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            inner: Rc::new(InstanceInner {
                record,
                types,
                dispatch,
                destroyed: Cell::new(false),
                manager,
            }),
        }
    }

    /// The id of the underlying record.
    pub fn id(&self) -> RecordId {
        self.inner.record.id()
    }

    /// The descriptor set this instance is composed of.
    pub fn type_set(&self) -> &TypeDescriptorSet {
        &self.inner.types
    }

    /// Whether the instance is composed of the named type.
    pub fn is_composed_of(&self, type_name: &str) -> bool {
        self.inner.types.contains(type_name)
    }

    /// Checked cast: returns a handle typed as `type_name`, failing if the
    /// instance is not composed of that type.
    pub fn cast(&self, type_name: &str) -> Result<CompositeInstance> {
        self.ensure_alive()?;
        if self.is_composed_of(type_name) {
            Ok(self.clone())
        } else {
            Err(TesseraError::NotComposedOf(type_name.to_owned()))
        }
    }

    /// Whether the instance has been destroyed by delete or migration.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Reference identity: whether two handles share one instance.
    pub fn ptr_eq(a: &CompositeInstance, b: &CompositeInstance) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Reads a property. Returns `Value::Null` when the property is unset.
    pub fn get(&self, accessor: &str) -> Result<Value> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.property_descriptor(accessor)?;
        let manager = core.session.property_manager();
        match &descriptor.kind {
            PropertyKind::Enum { .. } => Ok(manager
                .get_enum_property(&self.inner.record, descriptor)?
                .map(Value::String)
                .unwrap_or(Value::Null)),
            _ => manager.get_property(&self.inner.record, descriptor),
        }
    }

    /// Writes a property. The value is checked against the declared kind;
    /// writing `Value::Null` removes the property.
    pub fn set(&self, accessor: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.property_descriptor(accessor)?;
        let value = value.into();
        if !descriptor.kind.accepts(&value) {
            return Err(TesseraError::ValueKindMismatch {
                property: accessor.to_owned(),
                expected: descriptor.kind.name(),
                actual: value.kind_name(),
            });
        }
        let manager = core.session.property_manager();
        match (&descriptor.kind, value) {
            (_, Value::Null) => manager.remove_property(&self.inner.record, descriptor),
            (PropertyKind::Enum { variants }, Value::String(variant)) => {
                if !variants.contains(&variant) {
                    return Err(TesseraError::UnknownEnumVariant {
                        property: accessor.to_owned(),
                        variant,
                    });
                }
                manager.set_enum_property(&self.inner.record, descriptor, &variant)
            }
            (_, value) => manager.set_property(&self.inner.record, descriptor, value),
        }
    }

    /// Whether a property is set.
    pub fn has(&self, accessor: &str) -> Result<bool> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.property_descriptor(accessor)?;
        core.session
            .property_manager()
            .has_property(&self.inner.record, descriptor)
    }

    /// Removes a property.
    pub fn remove(&self, accessor: &str) -> Result<()> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.property_descriptor(accessor)?;
        core.session
            .property_manager()
            .remove_property(&self.inner.record, descriptor)
    }

    /// Reads a single-valued relation, mapping the related record to its
    /// composite instance.
    pub fn relation(&self, accessor: &str) -> Result<Option<CompositeInstance>> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.relation_descriptor(accessor, Cardinality::Single)?;
        let manager = core.session.property_manager();
        match manager.single_relation(&self.inner.record, descriptor)? {
            Some(relation) => {
                let other = self.other_end(&core, descriptor, &relation)?;
                Ok(Some(ManagerInner::instance_for(&core, &other)?))
            }
            None => Ok(None),
        }
    }

    /// Replaces a single-valued relation. `None` removes it.
    pub fn set_relation(
        &self,
        accessor: &str,
        target: Option<&CompositeInstance>,
    ) -> Result<()> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.relation_descriptor(accessor, Cardinality::Single)?;
        if let Some(target) = target {
            target.ensure_alive()?;
        }
        let manager = core.session.property_manager();
        if let Some(existing) = manager.single_relation(&self.inner.record, descriptor)? {
            manager.delete_relation(&existing)?;
        }
        if let Some(target) = target {
            manager.create_relation(&self.inner.record, descriptor, target.record())?;
        }
        Ok(())
    }

    /// Reads a collection relation, mapping every related record to its
    /// composite instance.
    pub fn relations(&self, accessor: &str) -> Result<Vec<CompositeInstance>> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.relation_descriptor(accessor, Cardinality::Many)?;
        let manager = core.session.property_manager();
        let relations = manager.relations(&self.inner.record, descriptor)?;
        let mut instances = Vec::with_capacity(relations.len());
        for relation in &relations {
            let other = self.other_end(&core, descriptor, relation)?;
            instances.push(ManagerInner::instance_for(&core, &other)?);
        }
        Ok(instances)
    }

    /// Adds a record to a collection relation.
    pub fn add_relation(&self, accessor: &str, target: &CompositeInstance) -> Result<()> {
        self.ensure_alive()?;
        target.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.relation_descriptor(accessor, Cardinality::Many)?;
        core.session
            .property_manager()
            .create_relation(&self.inner.record, descriptor, target.record())?;
        Ok(())
    }

    /// Removes a record from a collection relation. Returns whether an edge
    /// was removed.
    pub fn remove_relation(
        &self,
        accessor: &str,
        target: &CompositeInstance,
    ) -> Result<bool> {
        self.ensure_alive()?;
        let core = self.core()?;
        let descriptor = self.relation_descriptor(accessor, Cardinality::Many)?;
        let manager = core.session.property_manager();
        for relation in manager.relations(&self.inner.record, descriptor)? {
            let other = self.other_end(&core, descriptor, &relation)?;
            if other.id() == target.id() {
                manager.delete_relation(&relation)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn record(&self) -> &Record {
        &self.inner.record
    }

    pub(crate) fn mark_destroyed(&self) {
        self.inner.destroyed.set(true);
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.inner.destroyed.get() {
            return Err(TesseraError::InstanceDestroyed(self.inner.record.id()));
        }
        Ok(())
    }

    fn core(&self) -> Result<Rc<ManagerInner>> {
        self.inner.manager.upgrade().ok_or(TesseraError::SessionClosed)
    }

    fn property_descriptor(&self, accessor: &str) -> Result<&PropertyDescriptor> {
        self.inner.dispatch.property(accessor).ok_or_else(|| {
            TesseraError::UnmappedOperation {
                accessor: accessor.to_owned(),
            }
        })
    }

    fn relation_descriptor(
        &self,
        accessor: &str,
        cardinality: Cardinality,
    ) -> Result<&RelationDescriptor> {
        let descriptor = self.inner.dispatch.relation(accessor).ok_or_else(|| {
            TesseraError::UnmappedOperation {
                accessor: accessor.to_owned(),
            }
        })?;
        match (descriptor.cardinality, cardinality) {
            (Cardinality::Single, Cardinality::Many) => {
                Err(TesseraError::SingleValuedRelation(accessor.to_owned()))
            }
            (Cardinality::Many, Cardinality::Single) => {
                Err(TesseraError::CollectionValuedRelation(accessor.to_owned()))
            }
            _ => Ok(descriptor),
        }
    }

    fn other_end(
        &self,
        core: &Rc<ManagerInner>,
        descriptor: &RelationDescriptor,
        relation: &Relation,
    ) -> Result<Record> {
        let manager = core.session.property_manager();
        match descriptor.direction {
            Direction::Outgoing => manager.relation_target(relation),
            Direction::Incoming => manager.relation_source(relation),
        }
    }
}

impl PartialEq for CompositeInstance {
    fn eq(&self, other: &Self) -> bool {
        self.inner.record.id() == other.inner.record.id()
    }
}

impl Eq for CompositeInstance {}

impl Hash for CompositeInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.record.id().hash(state);
    }
}

impl fmt::Display for CompositeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.inner.types.names().collect();
        write!(f, "{}, id={}", names.join("|"), self.inner.record.id())
    }
}

impl fmt::Debug for CompositeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeInstance")
            .field("id", &self.inner.record.id())
            .field("types", &self.inner.types.names().collect::<Vec<_>>())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}
