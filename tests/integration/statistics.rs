//! Server statistics scenarios

use crate::common::*;

#[test]
fn counters_track_operations_and_sum_across_servers() {
    let server_a = spawn_server();
    let server_b = spawn_server();
    let client = remote_client(&[server_a.addr(), server_b.addr()]);

    // One object pinned to each server.
    let on_a = Object::with_index(&client, 0, "ns", "a").unwrap();
    let on_b = Object::with_index(&client, 1, "ns", "b").unwrap();

    let mut batch = client.batch(Template::Default);
    on_a.create(&mut batch);
    on_b.create(&mut batch);
    on_a.write(&mut batch, Bytes::from_static(b"0123456789"), 0);
    batch.execute().unwrap();

    let mut batch = client.batch(Template::Default);
    let read = on_a.read(&mut batch, 10, 0);
    let status = on_b.status(&mut batch);
    batch.execute().unwrap();
    assert_eq!(read.bytes_read(), 10);
    assert!(status.exists());

    let per_server = client.server_statistics().unwrap();
    assert_eq!(per_server.len(), 2);
    // counter order: created, deleted, stated, sync, read, written,
    // received, sent
    assert_eq!(per_server[0][0], 1);
    assert_eq!(per_server[1][0], 1);
    assert_eq!(per_server[0][4], 10);
    assert_eq!(per_server[0][5], 10);
    assert_eq!(per_server[1][2], 1);

    let total = client.statistics_total().unwrap();
    assert_eq!(total[0], 2);
    assert_eq!(total[4], 10);
    assert!(total[6] > 0);
    assert!(total[7] > 0);

    client.shutdown().unwrap();
}
