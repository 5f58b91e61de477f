//! Key-value scenarios

use crate::common::*;

#[test]
fn put_get_iterate_across_two_servers() {
    let server_a = spawn_server();
    let server_b = spawn_server();
    let client = remote_client(&[server_a.addr(), server_b.addr()]);

    // Pin pairs to explicit servers: k1/k2 on 0, k3 on 1.
    let k1 = KvPair::with_index(&client, 0, "ns", "k1").unwrap();
    let k2 = KvPair::with_index(&client, 0, "ns", "k2").unwrap();
    let k3 = KvPair::with_index(&client, 1, "ns", "k3").unwrap();

    let mut batch = client.batch(Template::Default);
    k1.put(&mut batch, Bytes::from_static(b"v1"));
    k2.put(&mut batch, Bytes::from_static(b"v2"));
    k3.put(&mut batch, Bytes::from_static(b"v3"));
    batch.execute().unwrap();

    // The merged iterator yields the union of both servers' pairs.
    let mut pairs: Vec<(String, Vec<u8>)> = reef::KvIterator::new(&client, "ns", None)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("k1".to_string(), b"v1".to_vec()),
            ("k2".to_string(), b"v2".to_vec()),
            ("k3".to_string(), b"v3".to_vec()),
        ]
    );

    let mut batch = client.batch(Template::Default);
    let hit = k2.get(&mut batch);
    let miss = KvPair::with_index(&client, 0, "ns", "missing")
        .unwrap()
        .get(&mut batch);
    batch.execute().unwrap();
    assert_eq!(hit.value(), Some(b"v2".to_vec()));
    assert_eq!(miss.value(), None);

    client.shutdown().unwrap();
}

#[test]
fn delete_and_missing_delete() {
    let client = local_client();
    let pair = KvPair::new(&client, "ns", "k").unwrap();

    let mut batch = client.batch(Template::Default);
    pair.put(&mut batch, Bytes::from_static(b"v"));
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    pair.delete(&mut batch);
    batch.execute().unwrap();

    // Deleting a missing key fails the batch.
    let mut batch = client.batch(Template::Default);
    pair.delete(&mut batch);
    assert!(batch.execute().unwrap_err().is_not_found());

    let mut batch = client.batch(Template::Default);
    let value = pair.get(&mut batch);
    batch.execute().unwrap();
    assert_eq!(value.value(), None);
}

/// Three deletes coalesce into one wire message; the server runs them in
/// one backend batch and still reports per-operation results.
#[test]
fn coalesced_deletes_report_per_operation_results() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);

    let a = KvPair::new(&client, "ns", "a").unwrap();
    let missing = KvPair::new(&client, "ns", "missing").unwrap();
    let z = KvPair::new(&client, "ns", "z").unwrap();

    let mut seed = client.batch(Template::Default);
    a.put(&mut seed, Bytes::from_static(b"1"));
    z.put(&mut seed, Bytes::from_static(b"1"));
    seed.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    a.delete(&mut batch);
    missing.delete(&mut batch);
    z.delete(&mut batch);
    assert!(batch.execute().unwrap_err().is_not_found());

    let mut check = client.batch(Template::Default);
    let a_val = a.get(&mut check);
    let z_val = z.get(&mut check);
    check.execute().unwrap();
    assert_eq!(a_val.value(), None);
    assert_eq!(z_val.value(), None);

    client.shutdown().unwrap();
}

#[test]
fn prefix_iteration_remote() {
    let server = spawn_server();
    let client = remote_client(&[server.addr()]);

    let mut batch = client.batch(Template::Default);
    for key in ["user:1", "user:2", "config:1"] {
        KvPair::new(&client, "ns", key)
            .unwrap()
            .put(&mut batch, Bytes::from(key.as_bytes().to_vec()));
    }
    batch.execute().unwrap();

    let keys: Vec<String> = reef::KvIterator::new(&client, "ns", Some("user:"))
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(keys, ["user:1", "user:2"]);
    client.shutdown().unwrap();
}
