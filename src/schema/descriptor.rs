//! Declarative schema descriptors.
//!
//! Applications describe their types once, as data, and hand the result to
//! [`TypeRegistry::new`](crate::schema::TypeRegistry::new). All structures
//! deserialize with serde so a schema can also be loaded from a
//! configuration document.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Name of a declared type.
pub type TypeName = String;

/// Backend-level discriminator attached to a record.
pub type Label = String;

/// The complete declared schema: types plus optional named queries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    /// The declared type descriptors.
    pub types: Vec<TypeDescriptor>,
    /// Pre-registered named queries.
    #[serde(default)]
    pub queries: Vec<QueryDescriptor>,
}

impl Schema {
    /// Creates a schema from a list of type descriptors.
    pub fn new(types: Vec<TypeDescriptor>) -> Self {
        Self {
            types,
            queries: Vec::new(),
        }
    }

    /// Adds a named query to the schema.
    pub fn with_query(mut self, query: QueryDescriptor) -> Self {
        self.queries.push(query);
        self
    }
}

/// One declared type: its storage label, supertypes, and accessor
/// descriptors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Unique name of the type.
    pub name: TypeName,
    /// The label contributed to records of this type. Types without a label
    /// are abstract: they contribute descriptors through `extends` only.
    #[serde(default)]
    pub label: Option<Label>,
    /// Names of declared supertypes whose labels and descriptors this type
    /// inherits.
    #[serde(default)]
    pub extends: Vec<TypeName>,
    /// Property descriptors declared directly on this type.
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
    /// Relation descriptors declared directly on this type.
    #[serde(default)]
    pub relations: Vec<RelationDescriptor>,
}

impl TypeDescriptor {
    /// Creates a descriptor with the given name and no members.
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            label: None,
            extends: Vec::new(),
            properties: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Sets the storage label.
    pub fn with_label(mut self, label: impl Into<Label>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Declares a supertype.
    pub fn with_supertype(mut self, name: impl Into<TypeName>) -> Self {
        self.extends.push(name.into());
        self
    }

    /// Declares a property.
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Declares a relation.
    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }
}

/// The value kind a property accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Boolean property.
    Bool,
    /// Signed 64-bit integer property.
    Int,
    /// 64-bit floating point property.
    Float,
    /// UTF-8 string property.
    String,
    /// Binary property.
    Bytes,
    /// Enumeration property restricted to the declared variant names.
    Enum {
        /// The accepted variant names.
        variants: Vec<String>,
    },
}

impl PropertyKind {
    /// Whether the given value matches this kind. `Null` is accepted by
    /// every kind (writing `Null` removes the property).
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyKind::Bool, Value::Bool(_)) => true,
            (PropertyKind::Int, Value::Int(_)) => true,
            (PropertyKind::Float, Value::Float(_)) => true,
            (PropertyKind::String, Value::String(_)) => true,
            (PropertyKind::Bytes, Value::Bytes(_)) => true,
            (PropertyKind::Enum { .. }, Value::String(_)) => true,
            _ => false,
        }
    }

    /// Human-readable kind name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Int => "int",
            PropertyKind::Float => "float",
            PropertyKind::String => "string",
            PropertyKind::Bytes => "bytes",
            PropertyKind::Enum { .. } => "enum",
        }
    }
}

/// One declared property accessor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Accessor name, also the backend property key.
    pub name: String,
    /// The value kind the property accepts.
    pub kind: PropertyKind,
    /// Whether the backend maintains an index for this property. At most
    /// one property per effective type may be indexed; `find` uses it.
    #[serde(default)]
    pub indexed: bool,
    /// Whether the property must be non-null for the instance to pass
    /// commit validation.
    #[serde(default)]
    pub required: bool,
}

impl PropertyDescriptor {
    /// Creates a property descriptor with the given name and kind.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            indexed: false,
            required: false,
        }
    }

    /// Marks the property as indexed.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Marks the property as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Direction of a relation relative to the declaring type's record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The declaring record is the source of the edge.
    Outgoing,
    /// The declaring record is the target of the edge.
    Incoming,
}

/// Cardinality of a relation accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one related record.
    Single,
    /// Any number of related records.
    Many,
}

/// One declared relation accessor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Accessor name.
    pub name: String,
    /// Backend edge type; opaque to the mapping layer.
    pub relation_type: String,
    /// Direction of the edge relative to the declaring record.
    pub direction: Direction,
    /// Single reference or collection.
    pub cardinality: Cardinality,
}

impl RelationDescriptor {
    /// Creates a relation descriptor.
    pub fn new(
        name: impl Into<String>,
        relation_type: impl Into<String>,
        direction: Direction,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            relation_type: relation_type.into(),
            direction,
            cardinality,
        }
    }
}

/// A pre-registered named query whose statement is resolved by name at
/// execution time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Unique query name.
    pub name: String,
    /// The statement in the backend's query language.
    pub statement: String,
}

impl QueryDescriptor {
    /// Creates a named query descriptor.
    pub fn new(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statement: statement.into(),
        }
    }
}
