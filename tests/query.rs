mod common;

use common::{factory, manager, store, PERSON_BY_NAME};
use tessera::session::{RawValue, Record};
use tessera::{CompositeInstance, TesseraError, Value};

#[test]
fn string_query_maps_record_columns_to_cached_instances() {
    let factory = factory();
    let store = store();
    let manager = manager(&factory, &store);

    manager.transaction().begin().expect("begin");
    let peter = manager.create("Person").expect("create");
    peter.set("name", "Peter").expect("set name");
    let paul = manager.create("Person").expect("create");
    paul.set("name", "Paul").expect("set name");

    let row = manager
        .query(PERSON_BY_NAME)
        .with_parameter("name", "Peter")
        .execute()
        .expect("execute")
        .single()
        .expect("one row");
    let mapped = row.instance("person").expect("instance column");
    assert!(CompositeInstance::ptr_eq(mapped, &peter));
    manager.transaction().commit().expect("commit");
}

#[test]
fn scalar_columns_pass_through() {
    let factory = factory();
    let store = store();
    store.register_query("count persons", |state, _params| {
        let count = state.records_with_label("Person").len() as i64;
        Ok(vec![vec![("n".to_owned(), RawValue::Scalar(Value::Int(count)))]])
    });
    let manager = manager(&factory, &store);

    manager.transaction().begin().expect("begin");
    manager
        .create("Person")
        .expect("create")
        .set("name", "Peter")
        .expect("set name");
    let row = manager
        .query("count persons")
        .execute()
        .expect("execute")
        .single()
        .expect("one row");
    assert_eq!(row.scalar("n").expect("scalar"), &Value::Int(1));
    assert_eq!(row.value().expect("single column").scalar(), Some(&Value::Int(1)));
    manager.transaction().commit().expect("commit");
}

#[test]
fn named_query_resolves_the_registered_statement() {
    let factory = factory();
    let store = store();
    let manager = manager(&factory, &store);

    manager.transaction().begin().expect("begin");
    let peter = manager.create("Person").expect("create");
    peter.set("name", "Peter").expect("set name");

    let row = manager
        .named_query("person_by_name")
        .expect("named query")
        .with_parameter("name", "Peter")
        .execute()
        .expect("execute")
        .single()
        .expect("one row");
    assert!(CompositeInstance::ptr_eq(
        row.instance("person").expect("instance"),
        &peter
    ));

    assert!(matches!(
        manager.named_query("nope"),
        Err(TesseraError::UnknownQuery(_))
    ));
    manager.transaction().commit().expect("commit");
}

#[test]
fn instance_parameters_are_passed_as_record_references() {
    let factory = factory();
    let store = store();
    store.register_query("echo instance", |_state, params| {
        let Some(RawValue::Record(record)) = params.get("instance") else {
            return Ok(Vec::new());
        };
        Ok(vec![vec![(
            "p".to_owned(),
            RawValue::Record(Record::new(record.id())),
        )]])
    });
    let manager = manager(&factory, &store);

    manager.transaction().begin().expect("begin");
    let peter = manager.create("Person").expect("create");
    peter.set("name", "Peter").expect("set name");

    let row = manager
        .query("echo instance")
        .with_instance_parameter("instance", &peter)
        .expect("bind instance")
        .execute()
        .expect("execute")
        .single()
        .expect("one row");
    assert!(CompositeInstance::ptr_eq(row.instance("p").expect("instance"), &peter));
    manager.transaction().commit().expect("commit");
}

#[test]
fn column_lookup_is_case_sensitive() {
    let factory = factory();
    let store = store();
    let manager = manager(&factory, &store);

    manager.transaction().begin().expect("begin");
    let peter = manager.create("Person").expect("create");
    peter.set("name", "Peter").expect("set name");

    let row = manager
        .query(PERSON_BY_NAME)
        .with_parameter("name", "Peter")
        .execute()
        .expect("execute")
        .single()
        .expect("one row");
    let err = row.get("Person").expect_err("wrong case must fail");
    match err {
        TesseraError::UnknownColumn { column, available } => {
            assert_eq!(column, "Person");
            assert_eq!(available, vec!["person".to_owned()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    manager.transaction().commit().expect("commit");
}

#[test]
fn single_result_contract_over_row_counts() {
    let factory = factory();
    let store = store();
    let manager = manager(&factory, &store);

    manager.transaction().begin().expect("begin");
    for _ in 0..2 {
        let paul = manager.create("Person").expect("create");
        paul.set("name", "Paul").expect("set name");
    }

    let empty = manager
        .query(PERSON_BY_NAME)
        .with_parameter("name", "Nobody")
        .execute()
        .expect("execute");
    assert!(!empty.has_result());
    assert!(matches!(empty.single(), Err(TesseraError::NoResult)));

    let two = manager
        .query(PERSON_BY_NAME)
        .with_parameter("name", "Paul")
        .execute()
        .expect("execute");
    assert!(two.has_result());
    assert!(matches!(
        two.single(),
        Err(TesseraError::AmbiguousResult { rows: 2 })
    ));
    manager.transaction().commit().expect("commit");
}

#[test]
fn queries_require_an_active_transaction() {
    let factory = factory();
    let store = store();
    let manager = manager(&factory, &store);

    let query = manager.query(PERSON_BY_NAME).with_parameter("name", "Peter");
    assert!(matches!(
        query.execute(),
        Err(TesseraError::TransactionNotActive)
    ));
}
