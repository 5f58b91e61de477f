//! Object store scenarios

use crate::common::*;

/// Create + write + read + status + delete against local backends.
#[test]
fn create_write_read_status_delete_local() {
    let client = local_client();
    run_object_lifecycle(&client);
}

/// The same lifecycle over a real TCP server.
#[test]
fn create_write_read_status_delete_remote() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);
    run_object_lifecycle(&client);
    client.shutdown().unwrap();
}

fn run_object_lifecycle(client: &Client) {
    let object = Object::new(client, "ns", "a").unwrap();

    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    let written = object.write(&mut batch, Bytes::from_static(b"hello world"), 0);
    batch.execute().unwrap();
    assert_eq!(written.get(), 11);

    let mut batch = client.batch(Template::Default);
    let read = object.read(&mut batch, 11, 0);
    let status = object.status(&mut batch);
    batch.execute().unwrap();
    assert_eq!(read.bytes_read(), 11);
    assert_eq!(read.take(), b"hello world");
    assert_eq!(status.size(), 11);
    assert!(status.modification_time() > 0);

    let mut batch = client.batch(Template::Default);
    object.delete(&mut batch);
    batch.execute().unwrap();

    // Status of a deleted object fails with NotFound.
    let mut batch = client.batch(Template::Default);
    let status = object.status(&mut batch);
    let err = batch.execute().unwrap_err();
    assert!(err.is_not_found());
    assert!(!status.exists());
}

#[test]
fn partial_read_at_end_of_object() {
    let client = local_client();
    let object = Object::new(&client, "ns", "short").unwrap();

    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    object.write(&mut batch, Bytes::from_static(b"abc"), 0);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    let read = object.read(&mut batch, 10, 1);
    batch.execute().unwrap();
    assert_eq!(read.bytes_read(), 2);
    assert_eq!(read.take(), b"bc");
}

#[test]
fn creating_an_existing_object_fails() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);
    let object = Object::new(&client, "ns", "dup").unwrap();

    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    assert!(matches!(
        batch.execute().unwrap_err(),
        reef::Error::Exists(_)
    ));
    client.shutdown().unwrap();
}

#[test]
fn object_iteration_with_prefix() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);

    let mut batch = client.batch(Template::Default);
    for name in ["log.0", "log.1", "data.0"] {
        Object::new(&client, "ns", name).unwrap().create(&mut batch);
    }
    batch.execute().unwrap();

    let names: Vec<String> = reef::ObjectIterator::new(&client, "ns", Some("log."))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(names, ["log.0", "log.1"]);

    let all: Vec<String> = reef::ObjectIterator::new(&client, "ns", None)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(all.len(), 3);
    client.shutdown().unwrap();
}

/// Multiple operations on one server coalesce into one batch message and
/// still report per-operation results.
#[test]
fn coalesced_operations_report_individually() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);

    let objects: Vec<Object> = (0..10)
        .map(|i| Object::new(&client, "ns", &format!("obj-{i}")).unwrap())
        .collect();

    // All creates share one key, as do all writes: two wire messages.
    let mut batch = client.batch(Template::Default);
    for object in &objects {
        object.create(&mut batch);
    }
    let mut counters = Vec::new();
    for (i, object) in objects.iter().enumerate() {
        counters.push(object.write(&mut batch, Bytes::from(vec![i as u8; 16]), 0));
    }
    batch.execute().unwrap();
    for counter in counters {
        assert_eq!(counter.get(), 16);
    }
    client.shutdown().unwrap();
}
