//! tessera — a metadata-driven object/graph mapping runtime.
//!
//! Applications declare a schema of typed descriptors (labels, properties,
//! relations) and interact with the datastore through identity-stable
//! composite instances: typed handles backed by records in an external
//! graph store. The crate manages type metadata, the per-transaction
//! identity cache, composite construction and dispatch, transaction
//! synchronization, and type migration; the storage engine itself is an
//! external collaborator behind the [`session`] contracts.
//!
//! ```
//! use std::rc::Rc;
//! use tessera::schema::{PropertyDescriptor, PropertyKind, Schema, TypeDescriptor};
//! use tessera::session::memory::MemoryStore;
//! use tessera::{GraphManagerFactory, Value};
//!
//! let schema = Schema::new(vec![TypeDescriptor::new("Person")
//!     .with_label("Person")
//!     .with_property(PropertyDescriptor::new("name", PropertyKind::String).indexed())]);
//! let factory = GraphManagerFactory::new(schema)?;
//! let store = MemoryStore::new();
//! let manager = factory.manager(Rc::new(store.session()));
//!
//! manager.transaction().begin()?;
//! let person = manager.create("Person")?;
//! person.set("name", "Ada")?;
//! manager.transaction().commit()?;
//!
//! manager.transaction().begin()?;
//! let found = manager.find("Person", "Ada")?.single()?;
//! assert_eq!(found.get("name")?, Value::from("Ada"));
//! manager.transaction().commit()?;
//! # Ok::<(), tessera::TesseraError>(())
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod instance;
pub mod manager;
pub mod query;
pub mod schema;
pub mod session;
pub mod transaction;
pub mod validation;
pub mod value;

pub use error::{Result, TesseraError};
pub use instance::{CompositeInstance, InstanceManager};
pub use manager::{GraphManager, GraphManagerFactory};
pub use query::{CompositeRow, InstanceResult, Query, QueryExpression, RowResult, RowValue};
pub use schema::{Schema, TypeDescriptorSet, TypeRegistry};
pub use transaction::{Synchronization, Transaction, TxState};
pub use validation::{ConstraintViolation, DeclaredConstraintValidator, InstanceValidator};
pub use value::Value;
