//! Structured database scenarios

use crate::common::*;
use reef::{CompareOp, FieldType, SelectorMode, Value};

fn variables_schema(client: &Client) -> Schema {
    let schema = Schema::new(client, "adios2", "variables").unwrap();
    schema.add_field("file", FieldType::String).unwrap();
    schema.add_field("name", FieldType::String).unwrap();
    schema.add_field("min", FieldType::Float64).unwrap();
    schema.add_field("max", FieldType::Float64).unwrap();
    schema.add_index(&["file"]).unwrap();
    schema
}

fn insert_row(client: &Client, schema: &Schema, file: &str, name: &str, min: f64, max: f64) {
    let mut entry = Entry::new(schema);
    entry.set("file", Value::Str(file.into())).unwrap();
    entry.set("name", Value::Str(name.into())).unwrap();
    entry.set("min", Value::F64(min)).unwrap();
    entry.set("max", Value::F64(max)).unwrap();

    let mut batch = client.batch(Template::Default);
    let id = entry.insert(&mut batch);
    batch.execute().unwrap();
    assert!(id.id().is_some());
}

fn run_insert_and_query(client: &Client) {
    let schema = variables_schema(client);
    let mut batch = client.batch(Template::Default);
    schema.create(&mut batch).unwrap();
    batch.execute().unwrap();

    insert_row(client, &schema, "demo.bp", "temperature", 1.0, 42.0);
    insert_row(client, &schema, "demo.bp", "pressure", 0.5, 10.0);
    insert_row(client, &schema, "other.bp", "temperature", 2.0, 3.0);

    let mut selector = Selector::new(&schema, SelectorMode::And);
    selector
        .add_field("file", CompareOp::Eq, Value::Str("demo.bp".into()))
        .unwrap();

    let rows: Vec<reef::DbRow> = reef::DbIterator::new(client, &schema, Some(&mut selector))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::Str("temperature".into())));
    assert_eq!(rows[1].get("name"), Some(&Value::Str("pressure".into())));

    // Rows come back in schema-declared field order.
    let fields: Vec<String> = rows[0].doc().iter().map(|(n, _)| n.to_string()).collect();
    assert_eq!(fields[..4], ["file", "name", "min", "max"]);
}

/// Schema + insert + selector query against local backends.
#[test]
fn insert_and_query_local() {
    let client = local_client();
    run_insert_and_query(&client);
}

/// The same flow over a real TCP server.
#[test]
fn insert_and_query_remote() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);
    run_insert_and_query(&client);
    client.shutdown().unwrap();
}

#[test]
fn schema_fetch_roundtrip() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);

    let schema = variables_schema(&client);
    let mut batch = client.batch(Template::Default);
    schema.create(&mut batch).unwrap();
    batch.execute().unwrap();

    // A fresh handle learns the definition from the server.
    let fetched = Schema::new(&client, "adios2", "variables").unwrap();
    let mut batch = client.batch(Template::Default);
    fetched.fetch(&mut batch);
    batch.execute().unwrap();

    assert!(fetched.is_server_side());
    assert_eq!(fetched, schema);
    assert!(fetched.add_field("extra", FieldType::Sint32).is_err());
    client.shutdown().unwrap();
}

#[test]
fn update_and_delete_matching() {
    let client = local_client();
    let schema = variables_schema(&client);
    let mut batch = client.batch(Template::Default);
    schema.create(&mut batch).unwrap();
    batch.execute().unwrap();

    insert_row(&client, &schema, "demo.bp", "temperature", 1.0, 42.0);
    insert_row(&client, &schema, "other.bp", "pressure", 0.5, 10.0);

    // Raise max for every row of demo.bp.
    let mut patch = Entry::new(&schema);
    patch.set("max", Value::F64(99.0)).unwrap();
    let mut selector = Selector::new(&schema, SelectorMode::And);
    selector
        .add_field("file", CompareOp::Eq, Value::Str("demo.bp".into()))
        .unwrap();
    let mut batch = client.batch(Template::Default);
    patch.update(&mut batch, &mut selector).unwrap();
    batch.execute().unwrap();

    let mut check = Selector::new(&schema, SelectorMode::And);
    check
        .add_field("max", CompareOp::Ge, Value::F64(99.0))
        .unwrap();
    let rows: Vec<_> = reef::DbIterator::new(&client, &schema, Some(&mut check))
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);

    // Delete them and confirm only other.bp remains.
    let mut gone = Selector::new(&schema, SelectorMode::And);
    gone.add_field("file", CompareOp::Eq, Value::Str("demo.bp".into()))
        .unwrap();
    let mut batch = client.batch(Template::Default);
    schema.delete_matching(&mut batch, &mut gone).unwrap();
    batch.execute().unwrap();

    let rest: Vec<_> = reef::DbIterator::new(&client, &schema, None)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].get("file"), Some(&Value::Str("other.bp".into())));
}

#[test]
fn selector_leaf_count_is_bounded() {
    let client = local_client();
    let schema = variables_schema(&client);

    let mut selector = Selector::new(&schema, SelectorMode::Or);
    for i in 0..reef::client::db::MAX_SELECTOR_LEAVES {
        selector
            .add_field("min", CompareOp::Ge, Value::F64(i as f64))
            .unwrap();
    }
    assert!(selector
        .add_field("min", CompareOp::Ge, Value::F64(0.0))
        .is_err());

    // A sub-selector pushing the total over the bound is also rejected.
    let mut one_more = Selector::new(&schema, SelectorMode::And);
    one_more
        .add_field("max", CompareOp::Lt, Value::F64(1.0))
        .unwrap();
    let mut full = Selector::new(&schema, SelectorMode::And);
    full.add_selector(selector).unwrap();
    assert!(full.add_selector(one_more).is_err());
}

#[test]
fn selector_rejects_unknown_fields_and_finalized_mutation() {
    let client = local_client();
    let schema = variables_schema(&client);

    let mut selector = Selector::new(&schema, SelectorMode::Or);
    assert!(selector
        .add_field("bogus", CompareOp::Eq, Value::I32(1))
        .is_err());
    assert!(selector
        .add_field("min", CompareOp::Eq, Value::Str("wrong type".into()))
        .is_err());

    selector
        .add_field("min", CompareOp::Lt, Value::F64(0.0))
        .unwrap();

    // Nested OR under AND.
    let mut outer = Selector::new(&schema, SelectorMode::And);
    outer
        .add_field("file", CompareOp::Eq, Value::Str("demo.bp".into()))
        .unwrap();
    outer.add_selector(selector).unwrap();
    assert_eq!(outer.leaf_count(), 2);

    // First use finalizes; mutation afterwards fails.
    let mut batch = client.batch(Template::Default);
    schema.create(&mut batch).unwrap();
    batch.execute().unwrap();
    let _ = reef::DbIterator::new(&client, &schema, Some(&mut outer)).unwrap();
    assert!(outer
        .add_field("max", CompareOp::Gt, Value::F64(1.0))
        .is_err());
}
