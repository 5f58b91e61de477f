//! Distributed object scenarios

use crate::common::*;
use reef::{Distribution, DistributedObject};

#[test]
fn striped_write_and_read_across_three_servers() {
    let servers: Vec<ServerHandle> = (0..3).map(|_| spawn_server()).collect();
    let addrs: Vec<&str> = servers.iter().map(|s| s.addr()).collect();
    let client = remote_client(&addrs);

    // Small stripes so a modest payload crosses every server.
    let distribution = Distribution::round_robin(3, 0, 8).unwrap();
    let object =
        DistributedObject::with_distribution(&client, "ns", "big", distribution).unwrap();

    let payload: Vec<u8> = (0..64u8).collect();
    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    let written = object.write(&mut batch, Bytes::from(payload.clone()), 0);
    batch.execute().unwrap();
    assert_eq!(written.get(), 64);

    let mut batch = client.batch(Template::Default);
    let read = object.read(&mut batch, 64, 0);
    batch.execute().unwrap();
    assert_eq!(read.bytes_read(), 64);
    assert_eq!(read.take(), payload);

    // Every server holds some stripes.
    for server in &servers {
        let counters = server.statistics().snapshot();
        assert!(counters[5] > 0, "server received no writes");
    }

    client.shutdown().unwrap();
}

#[test]
fn unaligned_offsets_partition_correctly() {
    let servers: Vec<ServerHandle> = (0..2).map(|_| spawn_server()).collect();
    let addrs: Vec<&str> = servers.iter().map(|s| s.addr()).collect();
    let client = remote_client(&addrs);

    let distribution = Distribution::round_robin(2, 0, 16).unwrap();
    let object =
        DistributedObject::with_distribution(&client, "ns", "odd", distribution).unwrap();

    let payload = vec![0xabu8; 40];
    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    object.write(&mut batch, Bytes::from(payload.clone()), 5);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    let read = object.read(&mut batch, 40, 5);
    let status = object.status(&mut batch);
    batch.execute().unwrap();
    assert_eq!(read.take(), payload);
    assert_eq!(status.size(), 45);

    client.shutdown().unwrap();
}

#[test]
fn strict_ordering_disables_fan_out_but_preserves_results() {
    let servers: Vec<ServerHandle> = (0..2).map(|_| spawn_server()).collect();
    let addrs: Vec<&str> = servers.iter().map(|s| s.addr()).collect();
    let client = remote_client(&addrs);

    let semantics = reef::Semantics::parse(Template::Default, "ordering=strict")
        .unwrap()
        .share();
    let distribution = Distribution::round_robin(2, 0, 4).unwrap();
    let object =
        DistributedObject::with_distribution(&client, "ns", "seq", distribution).unwrap();

    let payload: Vec<u8> = (0..32u8).collect();
    let mut batch = client.batch_with_semantics(semantics.clone());
    object.create(&mut batch);
    object.write(&mut batch, Bytes::from(payload.clone()), 0);
    batch.execute().unwrap();

    let mut batch = client.batch_with_semantics(semantics);
    let read = object.read(&mut batch, 32, 0);
    batch.execute().unwrap();
    assert_eq!(read.take(), payload);

    client.shutdown().unwrap();
}

#[test]
fn delete_removes_all_chunks() {
    let servers: Vec<ServerHandle> = (0..2).map(|_| spawn_server()).collect();
    let addrs: Vec<&str> = servers.iter().map(|s| s.addr()).collect();
    let client = remote_client(&addrs);

    let object = DistributedObject::new(&client, "ns", "victim").unwrap();
    let mut batch = client.batch(Template::Default);
    object.create(&mut batch);
    object.write(&mut batch, Bytes::from(vec![1u8; 16]), 0);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    object.delete(&mut batch);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    let status = object.status(&mut batch);
    assert!(batch.execute().is_err());
    assert!(!status.exists());

    client.shutdown().unwrap();
}
