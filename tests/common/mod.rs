#![allow(dead_code)]

use std::rc::Rc;

use tessera::schema::{
    Cardinality, Direction, PropertyDescriptor, PropertyKind, QueryDescriptor,
    RelationDescriptor, Schema, TypeDescriptor,
};
use tessera::session::memory::MemoryStore;
use tessera::session::{RawValue, Record};
use tessera::{GraphManager, GraphManagerFactory};

/// Statement of the pre-registered person-by-name query.
pub const PERSON_BY_NAME: &str = "person where name = $name return person";

pub fn schema() -> Schema {
    Schema::new(vec![
        TypeDescriptor::new("Person")
            .with_label("Person")
            .with_property(PropertyDescriptor::new("name", PropertyKind::String).indexed()),
        TypeDescriptor::new("Employee")
            .with_label("Employee")
            .with_supertype("Person")
            .with_property(PropertyDescriptor::new("salary", PropertyKind::Int)),
        TypeDescriptor::new("Group")
            .with_label("Group")
            .with_property(PropertyDescriptor::new("title", PropertyKind::String).indexed())
            .with_relation(RelationDescriptor::new(
                "members",
                "MEMBER",
                Direction::Outgoing,
                Cardinality::Many,
            )),
        TypeDescriptor::new("Document")
            .with_label("Document")
            .with_property(
                PropertyDescriptor::new("title", PropertyKind::String)
                    .indexed()
                    .required(),
            )
            .with_property(PropertyDescriptor::new(
                "state",
                PropertyKind::Enum {
                    variants: vec!["Draft".into(), "Published".into()],
                },
            ))
            .with_relation(RelationDescriptor::new(
                "author",
                "AUTHORED_BY",
                Direction::Outgoing,
                Cardinality::Single,
            )),
    ])
    .with_query(QueryDescriptor::new("person_by_name", PERSON_BY_NAME))
}

pub fn factory() -> GraphManagerFactory {
    GraphManagerFactory::new(schema()).expect("factory")
}

pub fn store() -> MemoryStore {
    init_logging();
    let store = MemoryStore::new();
    store.register_query(PERSON_BY_NAME, |state, params| {
        let Some(RawValue::Scalar(name)) = params.get("name") else {
            return Ok(Vec::new());
        };
        Ok(state
            .records_with_label("Person")
            .into_iter()
            .filter(|id| state.property(*id, "name") == Some(name))
            .map(|id| vec![("person".to_owned(), RawValue::Record(Record::new(id)))])
            .collect())
    });
    store
}

pub fn manager(factory: &GraphManagerFactory, store: &MemoryStore) -> GraphManager {
    factory.manager(Rc::new(store.session()))
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
