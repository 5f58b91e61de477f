//! Batch engine semantics scenarios

use crate::common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Eventually consistent writes are deferred and become observable before
/// any read executes.
#[test]
fn eventual_writes_flush_before_reads() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);

    let object = Object::new(&client, "ns", "log").unwrap();
    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    batch.execute().unwrap();

    let eventual = reef::Semantics::parse(Template::Default, "consistency=eventual")
        .unwrap()
        .share();

    // A thousand deferred writes; every execute returns immediately.
    for i in 0..1000u64 {
        let mut batch = client.batch_with_semantics(eventual.clone());
        object.write(&mut batch, Bytes::from_static(b"x"), i);
        batch.execute().unwrap();
    }

    // The read batch flushes the cache first.
    let mut batch = client.batch(Template::Default);
    let read = object.read(&mut batch, 1000, 0);
    batch.execute().unwrap();
    assert_eq!(read.bytes_read(), 1000);
    assert!(read.take().iter().all(|&b| b == b'x'));

    client.shutdown().unwrap();
}

/// Iterator creation also flushes cached batches.
#[test]
fn iterators_flush_the_cache() {
    let client = local_client();
    let eventual = reef::Semantics::parse(Template::Default, "consistency=eventual")
        .unwrap()
        .share();

    let mut batch = client.batch_with_semantics(eventual);
    KvPair::new(&client, "ns", "deferred")
        .unwrap()
        .put(&mut batch, Bytes::from_static(b"v"));
    batch.execute().unwrap();

    let pairs: Vec<_> = reef::KvIterator::new(&client, "ns", None)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(pairs, vec![("deferred".to_string(), b"v".to_vec())]);
}

/// Cached batch errors surface at the flush, not at enqueue time.
#[test]
fn cached_errors_surface_at_flush() {
    let client = local_client();
    let eventual = reef::Semantics::parse(Template::Default, "consistency=eventual")
        .unwrap()
        .share();

    // Deleting a missing key will fail, but only when flushed.
    let mut batch = client.batch_with_semantics(eventual);
    KvPair::new(&client, "ns", "missing")
        .unwrap()
        .delete(&mut batch);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    let value = KvPair::new(&client, "ns", "other").unwrap().get(&mut batch);
    assert!(batch.execute().unwrap_err().is_not_found());
    assert_eq!(value.value(), None);
}

#[test]
fn second_execute_is_a_no_op() {
    let client = local_client();
    let object = Object::new(&client, "ns", "once").unwrap();

    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    batch.execute().unwrap();
    // Executing again must not re-create (which would fail with Exists).
    batch.execute().unwrap();
}

#[test]
fn async_execution_runs_callback_and_wait_returns_result() {
    let client = local_client();
    let object = Object::new(&client, "ns", "async").unwrap();

    let called = Arc::new(AtomicBool::new(false));
    let called_in_callback = Arc::clone(&called);

    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    let written = object.write(&mut batch, Bytes::from_static(b"payload"), 0);
    let handle = batch.execute_async(move |success| {
        assert!(success);
        called_in_callback.store(true, Ordering::Release);
    });

    handle.wait().unwrap();
    assert!(called.load(Ordering::Acquire));
    assert_eq!(written.get(), 7);
}

#[test]
fn async_failure_reaches_callback_and_wait() {
    let client = local_client();
    let pair = KvPair::new(&client, "ns", "nope").unwrap();

    let mut batch = client.batch(Template::Default);
    pair.delete(&mut batch);
    let handle = batch.execute_async(|success| assert!(!success));
    assert!(handle.wait().unwrap_err().is_not_found());
}

/// A same-kind multi-operation group under atomicity=batch runs through
/// one backend batch. The in-memory backend exposes no transactions, so
/// the engine degrades to per-operation atomicity with a warning; a
/// failing operation inside the group still fails the whole batch.
#[test]
fn same_kind_batch_atomicity_reports_group_failure() {
    let client = local_client();
    let semantics = reef::Semantics::parse(Template::Default, "atomicity=batch")
        .unwrap()
        .share();

    let a = KvPair::new(&client, "ns", "a").unwrap();
    let missing = KvPair::new(&client, "ns", "missing").unwrap();
    let z = KvPair::new(&client, "ns", "z").unwrap();

    let mut seed = client.batch(Template::Default);
    a.put(&mut seed, Bytes::from_static(b"1"));
    z.put(&mut seed, Bytes::from_static(b"1"));
    seed.execute().unwrap();

    // Three consecutive deletes coalesce into one group; the middle key
    // is absent.
    let mut batch = client.batch_with_semantics(semantics);
    a.delete(&mut batch);
    missing.delete(&mut batch);
    z.delete(&mut batch);
    assert!(batch.execute().unwrap_err().is_not_found());

    // Degraded per-operation atomicity: the surrounding deletes applied.
    let mut check = client.batch(Template::Default);
    let a_val = a.get(&mut check);
    let z_val = z.get(&mut check);
    check.execute().unwrap();
    assert_eq!(a_val.value(), None);
    assert_eq!(z_val.value(), None);
}

#[test]
fn batch_atomicity_across_kinds_is_not_supported() {
    let client = local_client();
    let semantics = reef::Semantics::parse(Template::Default, "atomicity=batch")
        .unwrap()
        .share();

    let mut batch = client.batch_with_semantics(semantics);
    Object::new(&client, "ns", "o").unwrap().create(&mut batch);
    KvPair::new(&client, "ns", "k")
        .unwrap()
        .put(&mut batch, Bytes::from_static(b"v"));
    assert!(matches!(
        batch.execute().unwrap_err(),
        reef::Error::NotSupported(_)
    ));
}

#[test]
fn empty_batch_succeeds() {
    let client = local_client();
    let mut batch = client.batch(Template::Default);
    assert_eq!(batch.operation_count(), 0);
    batch.execute().unwrap();
}
