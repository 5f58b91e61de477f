//! Message dispatch
//!
//! One handler per operation family. Handlers parse the request payload in
//! FIFO order, apply each sub-operation to the backend, and build the
//! reply the client expects:
//!
//! - create/delete/open/close/sync and kv put/delete reply with one result
//!   code per operation, and only when the request's safety flags ask for
//!   an acknowledgment;
//! - status, read, kv get and all db operations are request/reply and
//!   always answered;
//! - listing operations stream entries terminated by a zero-length entry;
//! - a failed read reports `bytes_read = 0` rather than killing the
//!   connection.
//!
//! Only transport and protocol errors propagate out of a handler; they
//! drop the connection.

use crate::chunk::MemoryChunk;
use crate::ServerBackends;
use bytes::Bytes;
use reef_backend::{BackendObject, DbBatch, KvBatch};
use reef_core::semantics::Semantics;
use reef_core::{Error, Result, Statistics, StatisticsType};
use reef_net::message::HEADER_SIZE;
use reef_net::{Endpoint, Message, MessageOp, ResultCode};

pub(crate) fn handle_message(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
    chunk: &mut MemoryChunk,
) -> Result<()> {
    match request.op() {
        MessageOp::ObjectCreate
        | MessageOp::ObjectOpen
        | MessageOp::ObjectDelete
        | MessageOp::ObjectClose
        | MessageOp::ObjectSync => object_meta(endpoint, request, backends, statistics),
        MessageOp::ObjectStatus => object_status(endpoint, request, backends, statistics),
        MessageOp::ObjectRead => object_read(endpoint, request, backends, statistics),
        MessageOp::ObjectWrite => object_write(endpoint, request, backends, statistics, chunk),
        MessageOp::ObjectGetAll | MessageOp::ObjectGetByPrefix => {
            object_list(endpoint, request, backends, statistics)
        }
        MessageOp::KvPut | MessageOp::KvDelete => kv_mutate(endpoint, request, backends, statistics),
        MessageOp::KvGet => kv_get(endpoint, request, backends, statistics),
        MessageOp::KvGetAll | MessageOp::KvGetByPrefix => {
            kv_list(endpoint, request, backends, statistics)
        }
        MessageOp::DbSchemaCreate
        | MessageOp::DbSchemaGet
        | MessageOp::DbSchemaDelete
        | MessageOp::DbInsert
        | MessageOp::DbUpdate
        | MessageOp::DbDelete => db_mutate(endpoint, request, backends, statistics),
        MessageOp::DbQuery => db_query(endpoint, request, backends, statistics),
        MessageOp::Statistics => send_statistics(endpoint, request, statistics),
        MessageOp::None => Err(Error::Protocol("received op type NONE".into())),
    }
}

fn send_reply(endpoint: &mut Endpoint, statistics: &Statistics, reply: &Message) -> Result<()> {
    endpoint.send(reply)?;
    statistics.add(
        StatisticsType::BytesSent,
        (HEADER_SIZE + reply.payload_len() + reply.side_payload_len()) as u64,
    );
    Ok(())
}

fn handle_for(namespace: &str, path: &str) -> BackendObject {
    BackendObject {
        namespace: namespace.to_string(),
        path: path.to_string(),
    }
}

fn object_meta(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let mut reply = request
        .flags()
        .wants_reply()
        .then(|| Message::reply_to(request));

    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let path = request.get_str()?;
        let result = match request.op() {
            MessageOp::ObjectCreate => backends.object.create(&namespace, &path).map(|_| ()),
            MessageOp::ObjectOpen => backends.object.open(&namespace, &path).map(|_| ()),
            MessageOp::ObjectDelete => backends.object.delete(&handle_for(&namespace, &path)),
            MessageOp::ObjectClose => backends.object.close(handle_for(&namespace, &path)),
            MessageOp::ObjectSync => backends.object.sync(&handle_for(&namespace, &path)),
            _ => unreachable!("object_meta only handles meta ops"),
        };
        if result.is_ok() {
            match request.op() {
                MessageOp::ObjectCreate => statistics.add(StatisticsType::FilesCreated, 1),
                MessageOp::ObjectDelete => statistics.add(StatisticsType::FilesDeleted, 1),
                MessageOp::ObjectSync => statistics.add(StatisticsType::SyncCount, 1),
                _ => {}
            }
        }
        if let Some(reply) = &mut reply {
            reply.append_4(ResultCode::from_result(&result) as u32);
        }
    }

    match reply {
        Some(reply) => send_reply(endpoint, statistics, &reply),
        None => Ok(()),
    }
}

/// Sentinel status for a missing object: `mtime = -1`, `size = u64::MAX`.
fn object_status(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let mut reply = Message::reply_to(request);
    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let path = request.get_str()?;
        match backends.object.status(&handle_for(&namespace, &path)) {
            Ok(status) => {
                reply.append_8(status.modification_time as u64);
                reply.append_8(status.size);
                statistics.add(StatisticsType::FilesStated, 1);
            }
            Err(_) => {
                reply.append_8((-1i64) as u64);
                reply.append_8(u64::MAX);
            }
        }
    }
    send_reply(endpoint, statistics, &reply)
}

fn object_read(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let mut reply = Message::reply_to(request);
    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let path = request.get_str()?;
        let length = request.get_8()?;
        let offset = request.get_8()?;

        let mut buf = vec![0u8; length as usize];
        match backends
            .object
            .read(&handle_for(&namespace, &path), &mut buf, offset)
        {
            Ok(bytes_read) => {
                buf.truncate(bytes_read as usize);
                reply.append_8(bytes_read);
                if bytes_read > 0 {
                    reply.add_send_data(Bytes::from(buf));
                }
                statistics.add(StatisticsType::BytesRead, bytes_read);
            }
            Err(_) => reply.append_8(0),
        }
    }
    send_reply(endpoint, statistics, &reply)
}

fn object_write(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
    chunk: &mut MemoryChunk,
) -> Result<()> {
    let mut reply = request
        .flags()
        .wants_reply()
        .then(|| Message::reply_to(request));

    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let path = request.get_str()?;
        let length = request.get_8()? as usize;
        let offset = request.get_8()?;

        // Bulk data follows the frame in operation order; it must be
        // consumed even if the backend write fails.
        let mut fallback;
        let buf: &mut [u8] = match chunk.get(length) {
            Some(slice) => slice,
            None => {
                fallback = vec![0u8; length];
                &mut fallback
            }
        };
        endpoint.read_bulk(buf)?;
        statistics.add(StatisticsType::BytesReceived, length as u64);

        let bytes_written = backends
            .object
            .write(&handle_for(&namespace, &path), buf, offset)
            .unwrap_or(0);
        statistics.add(StatisticsType::BytesWritten, bytes_written);

        if let Some(reply) = &mut reply {
            reply.append_8(bytes_written);
        }
    }

    match reply {
        Some(reply) => send_reply(endpoint, statistics, &reply),
        None => Ok(()),
    }
}

fn object_list(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let namespace = request.get_str()?;
    let mut iter = match request.op() {
        MessageOp::ObjectGetAll => backends.object.get_all(&namespace)?,
        MessageOp::ObjectGetByPrefix => {
            let prefix = request.get_str()?;
            backends.object.get_by_prefix(&namespace, &prefix)?
        }
        _ => unreachable!("object_list only handles listing ops"),
    };

    let mut reply = Message::reply_to(request);
    loop {
        match backends.object.iterate(&mut iter) {
            Ok(name) => reply.append_str(&name)?,
            Err(Error::IteratorEnd) => break,
            Err(e) => return Err(e),
        }
    }
    // Empty name terminates the stream.
    reply.append_str("")?;
    send_reply(endpoint, statistics, &reply)
}

/// Open the message's kv batch on the first operation; all sub-operations
/// of one message must share a namespace (the client groups them so).
fn kv_batch_for<'a>(
    backends: &ServerBackends,
    semantics: &Semantics,
    batch: &'a mut Option<KvBatch>,
    namespace: &str,
) -> Result<&'a mut KvBatch> {
    if let Some(open) = batch {
        if open.namespace != namespace {
            return Err(Error::Protocol(
                "kv operations in one message must share a namespace".into(),
            ));
        }
    } else {
        *batch = Some(backends.kv.batch_start(namespace, semantics)?);
    }
    Ok(batch.as_mut().expect("batch opened above"))
}

/// Same contract as [`kv_batch_for`] for the database backend.
fn db_batch_for<'a>(
    backends: &ServerBackends,
    semantics: &Semantics,
    batch: &'a mut Option<DbBatch>,
    namespace: &str,
) -> Result<&'a mut DbBatch> {
    if let Some(open) = batch {
        if open.namespace != namespace {
            return Err(Error::Protocol(
                "db operations in one message must share a namespace".into(),
            ));
        }
    } else {
        *batch = Some(backends.db.batch_start(namespace, semantics)?);
    }
    Ok(batch.as_mut().expect("batch opened above"))
}

fn kv_mutate(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let semantics = Semantics::default();
    let mut reply = request
        .flags()
        .wants_reply()
        .then(|| Message::reply_to(request));

    // One backend batch covers every sub-operation of the message.
    let mut batch = None;
    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let key = request.get_str()?;
        let open = kv_batch_for(backends, &semantics, &mut batch, &namespace)?;
        let result = match request.op() {
            MessageOp::KvPut => {
                let len = request.get_4()? as usize;
                let value = request.get_n(len)?;
                backends.kv.put(open, &key, &value)
            }
            MessageOp::KvDelete => backends.kv.delete(open, &key),
            _ => unreachable!("kv_mutate only handles put/delete"),
        };
        if let Some(reply) = &mut reply {
            reply.append_4(ResultCode::from_result(&result) as u32);
        }
    }
    if let Some(open) = batch {
        backends.kv.batch_execute(open)?;
    }

    match reply {
        Some(reply) => send_reply(endpoint, statistics, &reply),
        None => Ok(()),
    }
}

fn kv_get(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let semantics = Semantics::default();
    let mut reply = Message::reply_to(request);

    let mut batch = None;
    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let key = request.get_str()?;
        let open = kv_batch_for(backends, &semantics, &mut batch, &namespace)?;
        match backends.kv.get(open, &key) {
            Ok(value) => {
                reply.append_4(value.len() as u32);
                reply.append_n(&value);
            }
            // Absent keys report a zero-length value.
            Err(_) => reply.append_4(0),
        }
    }
    if let Some(open) = batch {
        backends.kv.batch_execute(open)?;
    }
    send_reply(endpoint, statistics, &reply)
}

fn kv_list(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let namespace = request.get_str()?;
    let mut iter = match request.op() {
        MessageOp::KvGetAll => backends.kv.get_all(&namespace)?,
        MessageOp::KvGetByPrefix => {
            let prefix = request.get_str()?;
            backends.kv.get_by_prefix(&namespace, &prefix)?
        }
        _ => unreachable!("kv_list only handles listing ops"),
    };

    let mut reply = Message::reply_to(request);
    loop {
        match backends.kv.iterate(&mut iter) {
            Ok((key, value)) => {
                reply.append_4(value.len() as u32);
                reply.append_n(&value);
                reply.append_str(&key)?;
            }
            Err(Error::IteratorEnd) => break,
            Err(e) => return Err(e),
        }
    }
    // Zero-length value terminates the stream.
    reply.append_4(0);
    send_reply(endpoint, statistics, &reply)
}

fn db_mutate(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let semantics = Semantics::default();
    let mut reply = Message::reply_to(request);

    let mut batch = None;
    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let name = request.get_str()?;
        let open = db_batch_for(backends, &semantics, &mut batch, &namespace)?;

        match request.op() {
            MessageOp::DbSchemaCreate => {
                let schema = request.get_doc()?;
                let result = backends.db.schema_create(open, &name, &schema);
                reply.append_4(ResultCode::from_result(&result) as u32);
            }
            MessageOp::DbSchemaGet => {
                let result = backends.db.schema_get(open, &name);
                reply.append_4(ResultCode::from_result(&result) as u32);
                if let Ok(schema) = result {
                    reply.append_doc(&schema)?;
                }
            }
            MessageOp::DbSchemaDelete => {
                let result = backends.db.schema_delete(open, &name);
                reply.append_4(ResultCode::from_result(&result) as u32);
            }
            MessageOp::DbInsert => {
                let entry = request.get_doc()?;
                let result = backends.db.insert(open, &name, &entry);
                reply.append_4(ResultCode::from_result(&result) as u32);
                if let Ok(id_doc) = result {
                    reply.append_doc(&id_doc)?;
                }
            }
            MessageOp::DbUpdate => {
                let selector = request.get_doc()?;
                let entry = request.get_doc()?;
                let result = backends.db.update(open, &name, &selector, &entry);
                reply.append_4(ResultCode::from_result(&result) as u32);
            }
            MessageOp::DbDelete => {
                let selector = request.get_doc()?;
                let result = backends.db.delete(open, &name, &selector);
                reply.append_4(ResultCode::from_result(&result) as u32);
            }
            _ => unreachable!("db_mutate only handles mutating db ops"),
        }
    }
    if let Some(open) = batch {
        backends.db.batch_execute(open)?;
    }
    send_reply(endpoint, statistics, &reply)
}

fn db_query(
    endpoint: &mut Endpoint,
    request: &mut Message,
    backends: &ServerBackends,
    statistics: &Statistics,
) -> Result<()> {
    let semantics = Semantics::default();
    let mut reply = Message::reply_to(request);

    let mut batch = None;
    for _ in 0..request.op_count() {
        let namespace = request.get_str()?;
        let name = request.get_str()?;
        let selector = request.get_doc()?;

        let open = db_batch_for(backends, &semantics, &mut batch, &namespace)?;
        match backends.db.query(open, &name, &selector) {
            Ok(mut iter) => loop {
                match backends.db.iterate(&mut iter) {
                    Ok(row) => {
                        reply.append_4(1);
                        reply.append_doc(&row)?;
                    }
                    Err(Error::IteratorEnd) => break,
                    Err(e) => return Err(e),
                }
            },
            // An unknown schema matches nothing; the stream is empty.
            Err(_) => {}
        }
        reply.append_4(0);
    }
    if let Some(open) = batch {
        backends.db.batch_execute(open)?;
    }
    send_reply(endpoint, statistics, &reply)
}

fn send_statistics(
    endpoint: &mut Endpoint,
    request: &mut Message,
    statistics: &Statistics,
) -> Result<()> {
    let mut reply = Message::reply_to(request);
    for counter in statistics.snapshot() {
        reply.append_8(counter);
    }
    send_reply(endpoint, statistics, &reply)
}
