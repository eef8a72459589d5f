mod common;

use std::collections::BTreeSet;
use std::rc::Rc;

use tessera::schema::{PropertyDescriptor, PropertyKind, Schema, TypeDescriptor};
use tessera::session::memory::MemoryStore;
use tessera::session::DatastoreSession;
use tessera::{CompositeInstance, GraphManager, GraphManagerFactory, TesseraError};

fn migration_schema() -> Schema {
    Schema::new(vec![
        TypeDescriptor::new("A")
            .with_label("La")
            .with_property(PropertyDescriptor::new("value", PropertyKind::String).indexed()),
        TypeDescriptor::new("B")
            .with_label("Lb")
            .with_property(PropertyDescriptor::new("flag", PropertyKind::Bool)),
        TypeDescriptor::new("C")
            .with_label("Lc")
            .with_property(PropertyDescriptor::new("title", PropertyKind::String).indexed()),
    ])
}

fn setup() -> (MemoryStore, GraphManager) {
    common::init_logging();
    let factory = GraphManagerFactory::new(migration_schema()).expect("factory");
    let store = MemoryStore::new();
    let manager = factory.manager(Rc::new(store.session()));
    (store, manager)
}

fn labels(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| (*n).to_owned()).collect()
}

#[test]
fn migration_applies_exactly_the_label_delta() {
    let (store, manager) = setup();

    manager.transaction().begin().expect("begin");
    let instance = manager.create_composite(&["A", "B"]).expect("create");
    let migrated = manager.migrate(&instance, &["B", "C"]).expect("migrate");
    let record = manager.instances().record(&migrated).expect("record");

    let names: Vec<&str> = migrated.type_set().names().collect();
    assert_eq!(names, vec!["B", "C"]);
    manager.transaction().commit().expect("commit");

    // La was removed, Lc added, Lb left untouched throughout.
    let session = store.session();
    let discriminators = session.discriminators(&record).expect("discriminators");
    assert_eq!(discriminators, labels(&["Lb", "Lc"]));
}

#[test]
fn migration_destroys_the_source_instance() {
    let (_store, manager) = setup();

    manager.transaction().begin().expect("begin");
    let instance = manager.create("A").expect("create");
    let _migrated = manager.migrate(&instance, &["C"]).expect("migrate");

    assert!(instance.is_destroyed());
    assert!(matches!(
        instance.get("value"),
        Err(TesseraError::InstanceDestroyed(_))
    ));
    assert!(matches!(
        manager.delete(&instance),
        Err(TesseraError::InstanceDestroyed(_))
    ));
    manager.transaction().commit().expect("commit");
}

#[test]
fn migration_preserves_record_identity() {
    let (_store, manager) = setup();

    manager.transaction().begin().expect("begin");
    let instance = manager.create("A").expect("create");
    let id = instance.id();
    let migrated = manager
        .migrate_with(&instance, &["C"], |old, new| {
            // The old instance is still readable while the strategy runs.
            let value = old.get("value")?;
            new.set("title", value)
        })
        .expect("migrate");
    assert_eq!(migrated.id(), id);

    // A lookup through the new indexed property resolves to the same
    // cached handle.
    migrated.set("title", "moved").expect("set title");
    let found = manager
        .find("C", "moved")
        .expect("find")
        .single()
        .expect("one match");
    assert!(CompositeInstance::ptr_eq(&migrated, &found));
    manager.transaction().commit().expect("commit");
}

#[test]
fn migration_strategy_copies_state() {
    let (_store, manager) = setup();

    manager.transaction().begin().expect("begin");
    let instance = manager.create("A").expect("create");
    instance.set("value", "payload").expect("set value");
    let migrated = manager
        .migrate_with(&instance, &["C"], |old, new| {
            new.set("title", old.get("value")?)
        })
        .expect("migrate");
    assert_eq!(migrated.get("title").expect("get title").as_str(), Some("payload"));
    manager.transaction().commit().expect("commit");
}

#[test]
fn zero_overlap_migration_is_permitted() {
    let (store, manager) = setup();

    manager.transaction().begin().expect("begin");
    let instance = manager.create("A").expect("create");
    let migrated = manager.migrate(&instance, &["C"]).expect("migrate");
    let record = manager.instances().record(&migrated).expect("record");
    manager.transaction().commit().expect("commit");

    let session = store.session();
    let discriminators = session.discriminators(&record).expect("discriminators");
    assert_eq!(discriminators, labels(&["Lc"]));
}

#[test]
fn migration_to_an_unknown_type_leaves_the_instance_intact() {
    let (_store, manager) = setup();

    manager.transaction().begin().expect("begin");
    let instance = manager.create("A").expect("create");
    assert!(matches!(
        manager.migrate(&instance, &["Ghost"]),
        Err(TesseraError::UnknownType(_))
    ));
    // The failed migration resolved its targets before touching anything.
    assert!(!instance.is_destroyed());
    instance.set("value", "still usable").expect("set value");
    manager.transaction().commit().expect("commit");
}
