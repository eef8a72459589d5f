//! One-shot type registry.
//!
//! Parses the declared [`Schema`] into resolved [`TypeMetadata`] at startup:
//! inheritance is flattened, labels are aggregated, and descriptor conflicts
//! are rejected. The registry is read-only afterwards and safe to share
//! across managers and threads.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::{Result, TesseraError};
use crate::schema::descriptor::{
    Label, PropertyDescriptor, QueryDescriptor, RelationDescriptor, Schema, TypeName,
};

/// Resolved metadata for one declared type: its own label, the aggregated
/// label set, and the effective (own plus inherited) descriptor lists.
#[derive(Debug)]
pub struct TypeMetadata {
    name: TypeName,
    label: Option<Label>,
    aggregated_labels: BTreeSet<Label>,
    ancestors: FxHashSet<TypeName>,
    properties: Vec<PropertyDescriptor>,
    relations: Vec<RelationDescriptor>,
    indexed: Option<PropertyDescriptor>,
}

impl TypeMetadata {
    /// The declared type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The label this type itself contributes, if any.
    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    /// The union of this type's label and all ancestor labels.
    pub fn aggregated_labels(&self) -> &BTreeSet<Label> {
        &self.aggregated_labels
    }

    /// Whether `name` is a (transitive) supertype of this type.
    pub fn has_ancestor(&self, name: &str) -> bool {
        self.ancestors.contains(name)
    }

    /// Effective property descriptors, own declarations first.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Effective relation descriptors, own declarations first.
    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    /// The effective indexed property, if the type declares or inherits one.
    pub fn indexed_property(&self) -> Option<&PropertyDescriptor> {
        self.indexed.as_ref()
    }
}

/// The possibly multi-type composition describing one live instance.
///
/// Derived, never stored: recomputed from a record's discriminator set on
/// load, or supplied explicitly on create.
#[derive(Clone, Debug)]
pub struct TypeDescriptorSet {
    types: SmallVec<[Arc<TypeMetadata>; 2]>,
}

impl TypeDescriptorSet {
    pub(crate) fn new(types: SmallVec<[Arc<TypeMetadata>; 2]>) -> Self {
        Self { types }
    }

    /// Iterates the member types in composition order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<TypeMetadata>> {
        self.types.iter()
    }

    /// Iterates the member type names in composition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name())
    }

    /// Whether the set contains the named type.
    pub fn contains(&self, name: &str) -> bool {
        self.types.iter().any(|t| t.name() == name)
    }

    /// Number of member types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the set is empty (an untyped record).
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Registry of all declared types and named queries.
///
/// Registration happens once per factory lifetime; lookups never mutate.
#[derive(Debug)]
pub struct TypeRegistry {
    types: FxHashMap<TypeName, Arc<TypeMetadata>>,
    order: Vec<TypeName>,
    queries: FxHashMap<String, QueryDescriptor>,
}

impl TypeRegistry {
    /// Builds the registry from a declared schema.
    ///
    /// Fails if the schema declares a type twice, extends an unknown type,
    /// contains an inheritance cycle, maps one accessor name to conflicting
    /// descriptors, or ends up with more than one indexed property per
    /// effective type.
    pub fn new(schema: Schema) -> Result<Self> {
        let mut by_name: FxHashMap<TypeName, &crate::schema::TypeDescriptor> =
            FxHashMap::default();
        for descriptor in &schema.types {
            if by_name.insert(descriptor.name.clone(), descriptor).is_some() {
                return Err(TesseraError::DuplicateType(descriptor.name.clone()));
            }
        }

        let mut types: FxHashMap<TypeName, Arc<TypeMetadata>> = FxHashMap::default();
        let mut order = Vec::with_capacity(schema.types.len());
        for descriptor in &schema.types {
            let chain = linearize(&descriptor.name, &by_name, &mut Vec::new())?;
            let metadata = resolve_type(descriptor, &chain)?;
            order.push(descriptor.name.clone());
            types.insert(descriptor.name.clone(), Arc::new(metadata));
        }

        let mut queries = FxHashMap::default();
        for query in &schema.queries {
            if queries.insert(query.name.clone(), query.clone()).is_some() {
                return Err(TesseraError::InvalidSchema(format!(
                    "query '{}' is declared more than once",
                    query.name
                )));
            }
        }

        Ok(Self {
            types,
            order,
            queries,
        })
    }

    /// Resolves a declared type by name.
    pub fn resolve(&self, name: &str) -> Result<&Arc<TypeMetadata>> {
        self.types
            .get(name)
            .ok_or_else(|| TesseraError::UnknownType(name.to_owned()))
    }

    /// Resolves a list of type names into a descriptor set, preserving
    /// order and dropping duplicates.
    pub fn resolve_set(&self, names: &[&str]) -> Result<TypeDescriptorSet> {
        let mut types: SmallVec<[Arc<TypeMetadata>; 2]> = SmallVec::new();
        for name in names {
            let metadata = self.resolve(name)?;
            if !types.iter().any(|t| t.name() == metadata.name()) {
                types.push(Arc::clone(metadata));
            }
        }
        Ok(TypeDescriptorSet::new(types))
    }

    /// Unions the aggregated labels of every member of the set.
    pub fn aggregated_labels(&self, set: &TypeDescriptorSet) -> BTreeSet<Label> {
        let mut labels = BTreeSet::new();
        for metadata in set.iter() {
            labels.extend(metadata.aggregated_labels().iter().cloned());
        }
        labels
    }

    /// Derives the type composition of a record from its discriminator set.
    ///
    /// Every registered type whose own label is present matches; a matched
    /// type that is a supertype of another matched type is dropped, so only
    /// the most specific types remain.
    pub fn types_for(&self, discriminators: &BTreeSet<Label>) -> TypeDescriptorSet {
        let matched: Vec<&Arc<TypeMetadata>> = self
            .order
            .iter()
            .filter_map(|name| self.types.get(name))
            .filter(|metadata| {
                metadata
                    .label()
                    .map(|label| discriminators.contains(label))
                    .unwrap_or(false)
            })
            .collect();
        let mut types: SmallVec<[Arc<TypeMetadata>; 2]> = SmallVec::new();
        for candidate in &matched {
            let superseded = matched
                .iter()
                .any(|other| other.name() != candidate.name() && other.has_ancestor(candidate.name()));
            if !superseded {
                types.push(Arc::clone(*candidate));
            }
        }
        TypeDescriptorSet::new(types)
    }

    /// Resolves a pre-registered named query.
    pub fn query(&self, name: &str) -> Result<&QueryDescriptor> {
        self.queries
            .get(name)
            .ok_or_else(|| TesseraError::UnknownQuery(name.to_owned()))
    }
}

/// Returns `name` followed by its transitive supertypes in depth-first
/// order, deduplicated, failing on unknown supertypes and cycles.
fn linearize<'a>(
    name: &str,
    by_name: &FxHashMap<TypeName, &'a crate::schema::TypeDescriptor>,
    stack: &mut Vec<TypeName>,
) -> Result<Vec<&'a crate::schema::TypeDescriptor>> {
    if stack.iter().any(|n| n == name) {
        return Err(TesseraError::InvalidSchema(format!(
            "inheritance cycle involving type '{name}'"
        )));
    }
    let descriptor = by_name
        .get(name)
        .ok_or_else(|| TesseraError::UnknownType(name.to_owned()))?;
    stack.push(name.to_owned());
    let mut chain = vec![*descriptor];
    for supertype in &descriptor.extends {
        for inherited in linearize(supertype, by_name, stack)? {
            if !chain.iter().any(|d| d.name == inherited.name) {
                chain.push(inherited);
            }
        }
    }
    stack.pop();
    Ok(chain)
}

fn resolve_type(
    descriptor: &crate::schema::TypeDescriptor,
    chain: &[&crate::schema::TypeDescriptor],
) -> Result<TypeMetadata> {
    let mut aggregated_labels = BTreeSet::new();
    let mut ancestors = FxHashSet::default();
    let mut properties: Vec<PropertyDescriptor> = Vec::new();
    let mut relations: Vec<RelationDescriptor> = Vec::new();

    for member in chain {
        if let Some(label) = &member.label {
            aggregated_labels.insert(label.clone());
        }
        if member.name != descriptor.name {
            ancestors.insert(member.name.clone());
        }
        for property in &member.properties {
            if relations.iter().any(|r| r.name == property.name) {
                return Err(accessor_conflict(&descriptor.name, &property.name));
            }
            match properties.iter().find(|p| p.name == property.name) {
                Some(existing) if existing.kind == property.kind => {}
                Some(_) => return Err(accessor_conflict(&descriptor.name, &property.name)),
                None => properties.push(property.clone()),
            }
        }
        for relation in &member.relations {
            if properties.iter().any(|p| p.name == relation.name) {
                return Err(accessor_conflict(&descriptor.name, &relation.name));
            }
            match relations.iter().find(|r| r.name == relation.name) {
                Some(existing) if *existing == *relation => {}
                Some(_) => return Err(accessor_conflict(&descriptor.name, &relation.name)),
                None => relations.push(relation.clone()),
            }
        }
    }

    let mut indexed = None;
    for property in properties.iter().filter(|p| p.indexed) {
        if indexed.is_some() {
            return Err(TesseraError::InvalidSchema(format!(
                "type '{}' has more than one indexed property",
                descriptor.name
            )));
        }
        indexed = Some(property.clone());
    }

    Ok(TypeMetadata {
        name: descriptor.name.clone(),
        label: descriptor.label.clone(),
        aggregated_labels,
        ancestors,
        properties,
        relations,
        indexed,
    })
}

fn accessor_conflict(type_name: &str, accessor: &str) -> TesseraError {
    TesseraError::InvalidSchema(format!(
        "accessor '{accessor}' on type '{type_name}' is declared with conflicting descriptors"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Cardinality, Direction, PropertyKind, RelationDescriptor, TypeDescriptor,
    };

    fn person() -> TypeDescriptor {
        TypeDescriptor::new("Person")
            .with_label("Person")
            .with_property(PropertyDescriptor::new("name", PropertyKind::String).indexed())
    }

    #[test]
    fn resolves_registered_types() {
        let registry = TypeRegistry::new(Schema::new(vec![person()])).expect("registry");
        let metadata = registry.resolve("Person").expect("resolve");
        assert_eq!(metadata.name(), "Person");
        assert_eq!(metadata.indexed_property().expect("indexed").name, "name");
        assert!(matches!(
            registry.resolve("Ghost"),
            Err(TesseraError::UnknownType(_))
        ));
    }

    #[test]
    fn inheritance_aggregates_labels_and_descriptors() {
        let employee = TypeDescriptor::new("Employee")
            .with_label("Employee")
            .with_supertype("Person")
            .with_property(PropertyDescriptor::new("salary", PropertyKind::Int));
        let registry =
            TypeRegistry::new(Schema::new(vec![person(), employee])).expect("registry");
        let metadata = registry.resolve("Employee").expect("resolve");
        let labels: Vec<&str> = metadata.aggregated_labels().iter().map(|l| l.as_str()).collect();
        assert_eq!(labels, vec!["Employee", "Person"]);
        // Inherited property and indexed property flow down.
        assert!(metadata.properties().iter().any(|p| p.name == "name"));
        assert_eq!(metadata.indexed_property().expect("indexed").name, "name");
        assert!(metadata.has_ancestor("Person"));
    }

    #[test]
    fn conflicting_property_kinds_rejected() {
        let a = TypeDescriptor::new("A")
            .with_label("A")
            .with_property(PropertyDescriptor::new("value", PropertyKind::String));
        let b = TypeDescriptor::new("B")
            .with_label("B")
            .with_supertype("A")
            .with_property(PropertyDescriptor::new("value", PropertyKind::Int));
        let err = TypeRegistry::new(Schema::new(vec![a, b])).expect_err("conflict");
        assert!(matches!(err, TesseraError::InvalidSchema(_)));
    }

    #[test]
    fn inheritance_cycle_rejected() {
        let a = TypeDescriptor::new("A").with_supertype("B");
        let b = TypeDescriptor::new("B").with_supertype("A");
        let err = TypeRegistry::new(Schema::new(vec![a, b])).expect_err("cycle");
        assert!(matches!(err, TesseraError::InvalidSchema(_)));
    }

    #[test]
    fn duplicate_indexed_property_rejected() {
        let a = TypeDescriptor::new("A")
            .with_label("A")
            .with_property(PropertyDescriptor::new("x", PropertyKind::Int).indexed())
            .with_property(PropertyDescriptor::new("y", PropertyKind::Int).indexed());
        let err = TypeRegistry::new(Schema::new(vec![a])).expect_err("duplicate index");
        assert!(matches!(err, TesseraError::InvalidSchema(_)));
    }

    #[test]
    fn types_for_keeps_most_specific_types() {
        let employee = TypeDescriptor::new("Employee")
            .with_label("Employee")
            .with_supertype("Person");
        let registry =
            TypeRegistry::new(Schema::new(vec![person(), employee])).expect("registry");

        let discriminators: BTreeSet<Label> =
            ["Person".to_owned(), "Employee".to_owned()].into_iter().collect();
        let set = registry.types_for(&discriminators);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["Employee"]);

        let person_only: BTreeSet<Label> = [String::from("Person")].into_iter().collect();
        let set = registry.types_for(&person_only);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["Person"]);
    }

    #[test]
    fn relation_accessor_union() {
        let group = TypeDescriptor::new("Group")
            .with_label("Group")
            .with_relation(RelationDescriptor::new(
                "members",
                "MEMBER",
                Direction::Outgoing,
                Cardinality::Many,
            ));
        let registry = TypeRegistry::new(Schema::new(vec![group])).expect("registry");
        let metadata = registry.resolve("Group").expect("resolve");
        assert_eq!(metadata.relations()[0].relation_type, "MEMBER");
    }
}
