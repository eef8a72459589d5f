//! Instance validation.
//!
//! Validation is consumed as a collaborator contract: the commit path hands
//! the validator the concrete set of live instances and raises
//! [`ValidationFailed`](crate::TesseraError::ValidationFailed) when
//! violations come back. [`DeclaredConstraintValidator`] covers the
//! constraints the schema can declare; applications plug in their own
//! engine by implementing [`InstanceValidator`].

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::instance::{CompositeInstance, InstanceManager};
use crate::session::RecordId;
use crate::transaction::Synchronization;

/// One constraint violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintViolation {
    /// The record the violating instance is bound to.
    pub record: RecordId,
    /// The declared type the constraint belongs to.
    pub type_name: String,
    /// The violating property accessor.
    pub property: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} on record {}: {}",
            self.type_name, self.property, self.record, self.message
        )
    }
}

/// Validates a set of live instances against declared constraints.
pub trait InstanceValidator {
    /// Returns all violations; an empty vector means the set is valid.
    fn validate(&self, instances: &[CompositeInstance]) -> Vec<ConstraintViolation>;
}

/// Validator enforcing the constraints declarable in the schema: `required`
/// properties must be non-null.
#[derive(Default)]
pub struct DeclaredConstraintValidator;

impl InstanceValidator for DeclaredConstraintValidator {
    fn validate(&self, instances: &[CompositeInstance]) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        for instance in instances {
            for metadata in instance.type_set().iter() {
                for property in metadata.properties().iter().filter(|p| p.required) {
                    let value = match instance.get(&property.name) {
                        Ok(value) => value,
                        Err(_) => continue,
                    };
                    if value.is_null() {
                        violations.push(ConstraintViolation {
                            record: instance.id(),
                            type_name: metadata.name().to_owned(),
                            property: property.name.clone(),
                            message: "required property is not set".to_owned(),
                        });
                    }
                }
            }
        }
        violations
    }
}

/// Runs validation over every cached instance before the external commit;
/// violations abort the commit.
pub(crate) struct ValidationSynchronization {
    pub(crate) validator: Option<Arc<dyn InstanceValidator>>,
    pub(crate) manager: InstanceManager,
}

impl Synchronization for ValidationSynchronization {
    fn before_completion(&self) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let violations = validator.validate(&self.manager.cached_instances());
        if violations.is_empty() {
            Ok(())
        } else {
            Err(crate::error::TesseraError::ValidationFailed { violations })
        }
    }

    fn after_completion(&self, _success: bool) {}
}
