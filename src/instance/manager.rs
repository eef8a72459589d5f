//! Composite instance management.
//!
//! The instance manager constructs, retrieves and destroys composite
//! instances, owns the transaction-scoped identity cache, and mediates all
//! datastore access on behalf of instances. Its load-bearing guarantee:
//! within one transaction scope, retrieving an instance for the same record
//! twice yields the same handle.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::instance::cache::InstanceCache;
use crate::instance::composite::{CompositeInstance, DispatchTable};
use crate::schema::{TypeDescriptorSet, TypeRegistry};
use crate::session::{DatastoreSession, Record};
use crate::transaction::Synchronization;

pub(crate) struct ManagerInner {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) session: Rc<dyn DatastoreSession>,
    pub(crate) cache: RefCell<InstanceCache>,
}

impl ManagerInner {
    /// Cache-or-construct for a record whose types are derived from its
    /// current discriminators.
    pub(crate) fn instance_for(this: &Rc<Self>, record: &Record) -> Result<CompositeInstance> {
        if let Some(hit) = this.cache.borrow().get(record.id()) {
            return Ok(hit);
        }
        let discriminators = this.session.discriminators(record)?;
        let types = this.registry.types_for(&discriminators);
        Self::construct(this, record, types)
    }

    /// Cache-or-construct with an explicitly supplied type set, skipping the
    /// discriminator lookup.
    pub(crate) fn instance_with(
        this: &Rc<Self>,
        record: &Record,
        types: TypeDescriptorSet,
    ) -> Result<CompositeInstance> {
        if let Some(hit) = this.cache.borrow().get(record.id()) {
            return Ok(hit);
        }
        Self::construct(this, record, types)
    }

    fn construct(
        this: &Rc<Self>,
        record: &Record,
        types: TypeDescriptorSet,
    ) -> Result<CompositeInstance> {
        let dispatch = DispatchTable::build(&types)?;
        let instance =
            CompositeInstance::new(record.clone(), types, dispatch, Rc::downgrade(this));
        this.cache.borrow_mut().insert(record.id(), instance.clone());
        debug!(record = record.id(), "composite instance constructed");
        Ok(instance)
    }
}

/// Constructs, retrieves and destroys composite instances for one
/// transaction scope.
#[derive(Clone)]
pub struct InstanceManager {
    inner: Rc<ManagerInner>,
}

impl InstanceManager {
    pub(crate) fn new(registry: Arc<TypeRegistry>, session: Rc<dyn DatastoreSession>) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                registry,
                session,
                cache: RefCell::new(InstanceCache::default()),
            }),
        }
    }

    /// Returns the composite instance for a record, constructing and caching
    /// it on first access. Idempotent on the identity axis: repeated calls
    /// with the same record within one transaction return the same handle.
    pub fn instance(&self, record: &Record) -> Result<CompositeInstance> {
        ManagerInner::instance_for(&self.inner, record)
    }

    /// As [`InstanceManager::instance`], but with the type set supplied
    /// directly — used right after `create`, before discriminators are
    /// queryable.
    pub fn instance_with(
        &self,
        record: &Record,
        types: TypeDescriptorSet,
    ) -> Result<CompositeInstance> {
        ManagerInner::instance_with(&self.inner, record, types)
    }

    /// Evicts the cache entry for the instance's record without touching
    /// backend state. Used immediately before deletion or migration so a
    /// concurrent lookup within the same transaction cannot return a stale
    /// entry.
    pub fn remove_instance(&self, instance: &CompositeInstance) {
        self.inner.cache.borrow_mut().evict(instance.id());
        debug!(record = instance.id(), "instance evicted");
    }

    /// Marks the instance permanently unusable.
    pub fn destroy_instance(&self, instance: &CompositeInstance) {
        instance.mark_destroyed();
        debug!(record = instance.id(), "instance destroyed");
    }

    /// The record an instance is bound to.
    pub fn record(&self, instance: &CompositeInstance) -> Result<Record> {
        instance.ensure_alive()?;
        Ok(instance.record().clone())
    }

    /// The type composition currently attached to a record, derived from
    /// its discriminators.
    pub fn types(&self, record: &Record) -> Result<TypeDescriptorSet> {
        let discriminators = self.inner.session.discriminators(record)?;
        Ok(self.inner.registry.types_for(&discriminators))
    }

    pub(crate) fn clear_cache(&self) {
        self.inner.cache.borrow_mut().clear();
    }

    pub(crate) fn cached_instances(&self) -> Vec<CompositeInstance> {
        self.inner.cache.borrow().values()
    }

    pub(crate) fn cache_len(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    pub(crate) fn session(&self) -> &Rc<dyn DatastoreSession> {
        &self.inner.session
    }

    pub(crate) fn registry(&self) -> &Arc<TypeRegistry> {
        &self.inner.registry
    }
}

/// Clears the instance cache on every transaction completion, successful
/// or not.
pub(crate) struct CacheSynchronization {
    pub(crate) manager: InstanceManager,
}

impl Synchronization for CacheSynchronization {
    fn after_completion(&self, success: bool) {
        debug!(
            success,
            entries = self.manager.cache_len(),
            "clearing instance cache"
        );
        self.manager.clear_cache();
    }
}
