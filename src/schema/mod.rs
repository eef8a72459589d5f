//! Declarative type descriptors and the one-shot type registry.

mod descriptor;
mod registry;

pub use descriptor::{
    Cardinality, Direction, Label, PropertyDescriptor, PropertyKind, QueryDescriptor,
    RelationDescriptor, Schema, TypeDescriptor, TypeName,
};
pub use registry::{TypeDescriptorSet, TypeMetadata, TypeRegistry};
