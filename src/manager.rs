//! The manager facade and its factory.
//!
//! [`GraphManagerFactory`] is built once from the declared schema and
//! spawns one [`GraphManager`] per unit of work. A manager owns one
//! datastore session, one instance cache and one coordinated transaction;
//! it is thread-confined — callers requiring concurrency obtain one
//! manager per thread.

use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, TesseraError};
use crate::instance::{CacheSynchronization, CompositeInstance, InstanceManager};
use crate::query::{InstanceResult, Query, QueryExpression};
use crate::schema::{Schema, TypeRegistry};
use crate::session::DatastoreSession;
use crate::transaction::Transaction;
use crate::validation::{
    ConstraintViolation, DeclaredConstraintValidator, InstanceValidator,
    ValidationSynchronization,
};
use crate::value::Value;

/// Creates managers for a declared schema.
///
/// The registry is parsed once here and shared read-only by every manager
/// this factory spawns. By default managers validate declared constraints
/// at commit; [`GraphManagerFactory::with_validator`] swaps in another
/// engine and [`GraphManagerFactory::without_validator`] disables
/// validation.
pub struct GraphManagerFactory {
    registry: Arc<TypeRegistry>,
    validator: Option<Arc<dyn InstanceValidator>>,
}

impl GraphManagerFactory {
    /// Parses the schema and builds the factory.
    pub fn new(schema: Schema) -> Result<Self> {
        Ok(Self {
            registry: Arc::new(TypeRegistry::new(schema)?),
            validator: Some(Arc::new(DeclaredConstraintValidator)),
        })
    }

    /// Replaces the validation collaborator.
    pub fn with_validator(mut self, validator: Arc<dyn InstanceValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Disables commit-time validation.
    pub fn without_validator(mut self) -> Self {
        self.validator = None;
        self
    }

    /// The shared type registry.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Creates a manager bound to the given datastore session.
    ///
    /// Synchronization hooks are registered here, once per manager, in
    /// their fixed order: validation first, then the cache-clearing hook.
    pub fn manager(&self, session: Rc<dyn DatastoreSession>) -> GraphManager {
        let instances = InstanceManager::new(Arc::clone(&self.registry), Rc::clone(&session));
        let transaction = Transaction::new(session.transaction());
        transaction.register_synchronization(Box::new(ValidationSynchronization {
            validator: self.validator.clone(),
            manager: instances.clone(),
        }));
        transaction.register_synchronization(Box::new(CacheSynchronization {
            manager: instances.clone(),
        }));
        debug!("manager created");
        GraphManager {
            registry: Arc::clone(&self.registry),
            session,
            instances,
            transaction,
            validator: self.validator.clone(),
        }
    }
}

/// The public operation surface: create, find, delete, migrate, query and
/// flush composite instances within one transaction scope.
///
/// All data operations require an active transaction and fail with
/// [`TesseraError::TransactionNotActive`] otherwise.
pub struct GraphManager {
    registry: Arc<TypeRegistry>,
    session: Rc<dyn DatastoreSession>,
    instances: InstanceManager,
    transaction: Transaction,
    validator: Option<Arc<dyn InstanceValidator>>,
}

impl GraphManager {
    /// A handle on this manager's coordinated transaction.
    pub fn transaction(&self) -> Transaction {
        self.transaction.clone()
    }

    /// The instance manager backing this facade.
    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    /// Creates a record of one declared type and returns its instance.
    pub fn create(&self, type_name: &str) -> Result<CompositeInstance> {
        self.create_composite(&[type_name])
    }

    /// Creates a record composed of several declared types.
    ///
    /// The record receives the union of the aggregated labels of every
    /// type; the returned instance carries the explicit type set, so no
    /// discriminator lookup happens.
    pub fn create_composite(&self, type_names: &[&str]) -> Result<CompositeInstance> {
        self.transaction.ensure_active()?;
        let types = self.registry.resolve_set(type_names)?;
        let discriminators = self.registry.aggregated_labels(&types);
        let record = self.session.create(&types, &discriminators)?;
        debug!(record = record.id(), types = ?type_names, "record created");
        self.instances.instance_with(&record, types)
    }

    /// Finds instances of a type by its indexed property value.
    ///
    /// The type must contribute a label and declare (or inherit) an indexed
    /// property; both are checked at call time.
    pub fn find(&self, type_name: &str, value: impl Into<Value>) -> Result<InstanceResult> {
        self.transaction.ensure_active()?;
        let metadata = self.registry.resolve(type_name)?;
        let label = metadata
            .label()
            .ok_or_else(|| TesseraError::MissingLabel(type_name.to_owned()))?;
        let indexed = metadata
            .indexed_property()
            .ok_or_else(|| TesseraError::MissingIndexedProperty(type_name.to_owned()))?;
        let records = self.session.find(label, &indexed.name, &value.into())?;
        let mut found = Vec::with_capacity(records.len());
        for record in &records {
            found.push(self.instances.instance(record)?);
        }
        Ok(InstanceResult::new(found))
    }

    /// Deletes an instance's record. The instance is evicted from the
    /// cache, destroyed, and the record removed from the datastore.
    pub fn delete(&self, instance: &CompositeInstance) -> Result<()> {
        self.transaction.ensure_active()?;
        let record = self.instances.record(instance)?;
        self.instances.remove_instance(instance);
        self.instances.destroy_instance(instance);
        self.session.delete(&record)?;
        debug!(record = record.id(), "record deleted");
        Ok(())
    }

    /// Migrates an instance to a new type composition, preserving record
    /// identity.
    pub fn migrate(
        &self,
        instance: &CompositeInstance,
        target_types: &[&str],
    ) -> Result<CompositeInstance> {
        self.migrate_impl(instance, target_types, None)
    }

    /// Migrates an instance to a new type composition, running `strategy`
    /// with the old and new instance so state can be copied between
    /// type-specific properties.
    ///
    /// The strategy runs after the record's discriminators have been
    /// rewritten and before the old instance is destroyed: the old
    /// instance's properties are still readable, but reads observe the
    /// already-relabeled record.
    pub fn migrate_with<F>(
        &self,
        instance: &CompositeInstance,
        target_types: &[&str],
        mut strategy: F,
    ) -> Result<CompositeInstance>
    where
        F: FnMut(&CompositeInstance, &CompositeInstance) -> Result<()>,
    {
        self.migrate_impl(instance, target_types, Some(&mut strategy))
    }

    fn migrate_impl(
        &self,
        instance: &CompositeInstance,
        target_types: &[&str],
        strategy: Option<&mut dyn FnMut(&CompositeInstance, &CompositeInstance) -> Result<()>>,
    ) -> Result<CompositeInstance> {
        self.transaction.ensure_active()?;
        let record = self.instances.record(instance)?;
        let current = self.instances.types(&record)?;
        let old_labels = self.registry.aggregated_labels(&current);
        let targets = self.registry.resolve_set(target_types)?;
        let new_labels = self.registry.aggregated_labels(&targets);
        // Labels in both sets stay untouched; only the symmetric
        // difference is applied.
        self.session.migrate(&record, &old_labels, &new_labels)?;
        self.instances.remove_instance(instance);
        let migrated = self.instances.instance_with(&record, targets)?;
        if let Some(strategy) = strategy {
            strategy(instance, &migrated)?;
        }
        self.instances.destroy_instance(instance);
        info!(record = record.id(), targets = ?target_types, "instance migrated");
        Ok(migrated)
    }

    /// Builds a query from a free-form statement.
    pub fn query(&self, statement: impl Into<String>) -> Query {
        Query::new(
            self.instances.clone(),
            self.transaction.clone(),
            QueryExpression::Statement(statement.into()),
        )
    }

    /// Builds a query from a name pre-registered in the schema.
    pub fn named_query(&self, name: &str) -> Result<Query> {
        self.registry.query(name)?;
        Ok(Query::new(
            self.instances.clone(),
            self.transaction.clone(),
            QueryExpression::Named(name.to_owned()),
        ))
    }

    /// Validates every instance currently resident in the cache without
    /// committing. Returns an empty set when no validator is configured.
    pub fn validate(&self) -> Vec<ConstraintViolation> {
        match &self.validator {
            Some(validator) => validator.validate(&self.instances.cached_instances()),
            None => Vec::new(),
        }
    }

    /// Flushes every cached instance's record to the datastore.
    pub fn flush(&self) -> Result<()> {
        self.transaction.ensure_active()?;
        for instance in self.instances.cached_instances() {
            self.session.flush(instance.record())?;
        }
        Ok(())
    }

    /// Closes the manager, dropping all cached instances. Handles held by
    /// the caller become unusable.
    pub fn close(&self) {
        if self.transaction.is_active() {
            warn!("manager closed with an active transaction");
        }
        self.instances.clear_cache();
        debug!("manager closed");
    }
}
