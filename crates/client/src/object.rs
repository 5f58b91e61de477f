//! Objects and distributed objects
//!
//! An [`Object`] is an opaque byte container on one server; its server
//! bucket is chosen by hashing the object name. A [`DistributedObject`]
//! spreads its logical byte range over all object servers according to a
//! [`Distribution`]; reads and writes split into per-server child
//! operations that run in parallel on the background pool unless the batch
//! semantics demand strict ordering.
//!
//! All methods queue deferred operations into a batch; results become
//! valid once the batch executed.

use crate::batch::Batch;
use crate::client::Client;
use crate::operation::{ByteCount, ExecKind, OperationKey, Payload, ReadSlot, StatusSlot};
use crate::wire::with_endpoint;
use bytes::Bytes;
use reef_backend::{BackendObject, ObjectBackend};
use reef_core::distribution::Distribution;
use reef_core::semantics::{OrderingMode, Persistency, SemanticsRef};
use reef_core::{trace, types, util, BackendKind, Error, Result};
use reef_net::{Message, MessageFlags, MessageOp, ResultCode};
use std::sync::Arc;

struct ObjectInner {
    namespace: String,
    name: String,
    index: u32,
}

/// An opaque byte container on one object server.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl Object {
    /// Reference an object; the server bucket is derived from the name.
    pub fn new(client: &Client, namespace: &str, name: &str) -> Result<Self> {
        let index = client.bucket_for(BackendKind::Object, name);
        Self::with_index(client, index, namespace, name)
    }

    /// Reference an object on an explicit server.
    pub fn with_index(client: &Client, index: u32, namespace: &str, name: &str) -> Result<Self> {
        types::validate_name("namespace", namespace)?;
        types::validate_name("object name", name)?;
        if index >= client.bucket_count(BackendKind::Object) {
            return Err(Error::InvalidArgument(format!(
                "object server index {index} out of range"
            )));
        }
        Ok(Self::from_parts(namespace, name, index))
    }

    pub(crate) fn from_parts(namespace: &str, name: &str, index: u32) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                namespace: namespace.to_string(),
                name: name.to_string(),
                index,
            }),
        }
    }

    /// The namespace.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The object name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The server bucket this object lives on.
    pub fn index(&self) -> u32 {
        self.inner.index
    }

    fn key(&self, kind: ExecKind) -> OperationKey {
        OperationKey {
            kind,
            server: self.inner.index,
            scope: String::new(),
        }
    }

    /// Queue creation of this object.
    pub fn create(&self, batch: &mut Batch) {
        batch.add(
            self.key(ExecKind::ObjectCreate),
            Payload::ObjectCreate {
                object: self.clone(),
            },
        );
    }

    /// Queue deletion of this object.
    pub fn delete(&self, batch: &mut Batch) {
        batch.add(
            self.key(ExecKind::ObjectDelete),
            Payload::ObjectDelete {
                object: self.clone(),
            },
        );
    }

    /// Queue a status query; the slot fills on execute.
    pub fn status(&self, batch: &mut Batch) -> StatusSlot {
        let slot = StatusSlot::new();
        batch.add(
            self.key(ExecKind::ObjectStatus),
            Payload::ObjectStatus {
                object: self.clone(),
                slot: slot.clone(),
            },
        );
        slot
    }

    /// Queue a flush of this object to durable media.
    pub fn sync(&self, batch: &mut Batch) {
        batch.add(
            self.key(ExecKind::ObjectSync),
            Payload::ObjectSync {
                object: self.clone(),
            },
        );
    }

    /// Queue a read of `length` bytes at `offset`.
    pub fn read(&self, batch: &mut Batch, length: u64, offset: u64) -> ReadSlot {
        let slot = ReadSlot::with_length(length);
        batch.add(
            self.key(ExecKind::ObjectRead),
            Payload::ObjectRead {
                object: self.clone(),
                length,
                offset,
                slot: slot.clone(),
            },
        );
        slot
    }

    /// Queue a write of `data` at `offset`. The returned counter holds the
    /// bytes written once the batch executed.
    pub fn write(&self, batch: &mut Batch, data: impl Into<Bytes>, offset: u64) -> ByteCount {
        let written = ByteCount::new();
        batch.add(
            self.key(ExecKind::ObjectWrite),
            Payload::ObjectWrite {
                object: self.clone(),
                data: data.into(),
                offset,
                written: written.clone(),
            },
        );
        written
    }

    fn backend_handle(&self) -> BackendObject {
        BackendObject {
            namespace: self.inner.namespace.clone(),
            path: self.inner.name.clone(),
        }
    }
}

struct DistObjectInner {
    namespace: String,
    name: String,
    distribution: Distribution,
}

/// An object whose byte range is striped over all object servers.
#[derive(Clone)]
pub struct DistributedObject {
    inner: Arc<DistObjectInner>,
}

impl DistributedObject {
    /// Reference a distributed object using the default round-robin
    /// distribution (configured stripe size, start server derived from the
    /// name so small objects spread evenly).
    pub fn new(client: &Client, namespace: &str, name: &str) -> Result<Self> {
        let server_count = client.bucket_count(BackendKind::Object);
        let start = util::server_index_for(name, server_count);
        let distribution =
            Distribution::round_robin(server_count, start, client.config().stripe_size)?;
        Self::with_distribution(client, namespace, name, distribution)
    }

    /// Reference a distributed object with an explicit distribution.
    pub fn with_distribution(
        client: &Client,
        namespace: &str,
        name: &str,
        distribution: Distribution,
    ) -> Result<Self> {
        types::validate_name("namespace", namespace)?;
        types::validate_name("object name", name)?;
        if distribution.server_count() != client.bucket_count(BackendKind::Object) {
            return Err(Error::InvalidArgument(
                "distribution server count does not match configuration".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(DistObjectInner {
                namespace: namespace.to_string(),
                name: name.to_string(),
                distribution,
            }),
        })
    }

    /// The namespace.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The object name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The distribution spreading this object.
    pub fn distribution(&self) -> &Distribution {
        &self.inner.distribution
    }

    fn key(&self, kind: ExecKind) -> OperationKey {
        OperationKey {
            kind,
            server: 0,
            scope: String::new(),
        }
    }

    /// Queue creation on every object server.
    pub fn create(&self, batch: &mut Batch) {
        batch.add(
            self.key(ExecKind::DistCreate),
            Payload::DistCreate {
                object: self.clone(),
            },
        );
    }

    /// Queue deletion on every object server.
    pub fn delete(&self, batch: &mut Batch) {
        batch.add(
            self.key(ExecKind::DistDelete),
            Payload::DistDelete {
                object: self.clone(),
            },
        );
    }

    /// Queue a status query; sizes and modification times are merged over
    /// all servers (maxima).
    pub fn status(&self, batch: &mut Batch) -> StatusSlot {
        let slot = StatusSlot::new();
        batch.add(
            self.key(ExecKind::DistStatus),
            Payload::DistStatus {
                object: self.clone(),
                slot: slot.clone(),
            },
        );
        slot
    }

    /// Queue a striped read of `length` bytes at `offset`.
    pub fn read(&self, batch: &mut Batch, length: u64, offset: u64) -> ReadSlot {
        let slot = ReadSlot::with_length(length);
        batch.add(
            self.key(ExecKind::DistRead),
            Payload::DistRead {
                object: self.clone(),
                length,
                offset,
                slot: slot.clone(),
            },
        );
        slot
    }

    /// Queue a striped write of `data` at `offset`.
    pub fn write(&self, batch: &mut Batch, data: impl Into<Bytes>, offset: u64) -> ByteCount {
        let written = ByteCount::new();
        batch.add(
            self.key(ExecKind::DistWrite),
            Payload::DistWrite {
                object: self.clone(),
                data: data.into(),
                offset,
                written: written.clone(),
            },
        );
        written
    }
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

fn meta_object(payload: &Payload) -> &Object {
    match payload {
        Payload::ObjectCreate { object }
        | Payload::ObjectDelete { object }
        | Payload::ObjectSync { object } => object,
        Payload::ObjectStatus { object, .. } => object,
        _ => unreachable!("meta executor received a non-meta payload"),
    }
}

/// Executor for object create/delete/status/sync groups on one server.
pub(crate) fn exec_object_meta(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    let _span = trace::enter("object_meta");

    if let Some(backend) = client.local_object() {
        return local_object_meta(backend, key.kind, &payloads);
    }

    let op = match key.kind {
        ExecKind::ObjectCreate => MessageOp::ObjectCreate,
        ExecKind::ObjectDelete => MessageOp::ObjectDelete,
        ExecKind::ObjectStatus => MessageOp::ObjectStatus,
        ExecKind::ObjectSync => MessageOp::ObjectSync,
        _ => unreachable!("meta executor received a non-meta kind"),
    };

    let mut message = Message::with_capacity(op, payloads.len() * 32);
    message.add_flags(MessageFlags::from_safety(semantics.safety()));
    for payload in &payloads {
        let object = meta_object(payload);
        message.add_operation();
        message.append_str(object.namespace())?;
        message.append_str(object.name())?;
    }

    // Status is a read-type operation: it always needs a reply.
    let want_reply = op == MessageOp::ObjectStatus || message.flags().wants_reply();

    let per_op_error = with_endpoint(client, BackendKind::Object, key.server, |endpoint| {
        endpoint.send(&message)?;
        if !want_reply {
            return Ok(None);
        }
        let mut reply = endpoint.receive()?;
        reply.expect_reply_for(&message)?;

        let mut first_error = None;
        for payload in &payloads {
            match payload {
                Payload::ObjectStatus { object, slot } => {
                    let mtime = reply.get_8()? as i64;
                    let size = reply.get_8()?;
                    if size == u64::MAX {
                        first_error.get_or_insert(Error::NotFound(format!(
                            "{}/{}",
                            object.namespace(),
                            object.name()
                        )));
                    } else {
                        slot.merge_max(mtime, size);
                    }
                }
                other => {
                    let object = meta_object(other);
                    let code = ResultCode::from_u32(reply.get_4()?)?;
                    let context = format!("{}/{}", object.namespace(), object.name());
                    if let Err(e) = code.into_result(&context) {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        Ok(first_error)
    })?;

    match per_op_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn local_object_meta(
    backend: &Arc<dyn ObjectBackend>,
    kind: ExecKind,
    payloads: &[Payload],
) -> Result<()> {
    let mut first_error = None;
    for payload in payloads {
        let result = match payload {
            Payload::ObjectCreate { object } => {
                backend.create(object.namespace(), object.name()).map(|_| ())
            }
            Payload::ObjectDelete { object } => backend.delete(&object.backend_handle()),
            Payload::ObjectSync { object } => backend.sync(&object.backend_handle()),
            Payload::ObjectStatus { object, slot } => backend
                .status(&object.backend_handle())
                .map(|status| slot.merge_max(status.modification_time, status.size)),
            _ => unreachable!("meta executor received a non-meta payload"),
        };
        debug_assert_eq!(payload.kind(), kind);
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// One per-server read: fills `slot` at `fill_pos` relative to the
/// original request.
struct ReadChild {
    object: Object,
    length: u64,
    offset: u64,
    slot: ReadSlot,
    fill_pos: u64,
}

/// One per-server write.
struct WriteChild {
    object: Object,
    data: Bytes,
    offset: u64,
    written: ByteCount,
}

pub(crate) fn exec_object_read(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    let children = payloads
        .into_iter()
        .map(|payload| {
            let Payload::ObjectRead {
                object,
                length,
                offset,
                slot,
            } = payload
            else {
                unreachable!("read executor received a non-read payload")
            };
            ReadChild {
                object,
                length,
                offset,
                slot,
                fill_pos: 0,
            }
        })
        .collect();
    read_group(client, semantics, key.server, children)
}

pub(crate) fn exec_object_write(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    let children = payloads
        .into_iter()
        .map(|payload| {
            let Payload::ObjectWrite {
                object,
                data,
                offset,
                written,
            } = payload
            else {
                unreachable!("write executor received a non-write payload")
            };
            WriteChild {
                object,
                data,
                offset,
                written,
            }
        })
        .collect();
    write_group(client, semantics, key.server, children)
}

fn read_group(
    client: &Client,
    _semantics: &SemanticsRef,
    server: u32,
    children: Vec<ReadChild>,
) -> Result<()> {
    let _span = trace::enter("object_read");

    if let Some(backend) = client.local_object() {
        let mut first_error = None;
        for child in &children {
            let mut buf = vec![0u8; child.length as usize];
            match backend.read(&child.object.backend_handle(), &mut buf, child.offset) {
                Ok(n) => child.slot.fill_at(child.fill_pos, &buf[..n as usize]),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        return match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        };
    }

    let mut message = Message::with_capacity(MessageOp::ObjectRead, children.len() * 48);
    for child in &children {
        message.add_operation();
        message.append_str(child.object.namespace())?;
        message.append_str(child.object.name())?;
        message.append_8(child.length);
        message.append_8(child.offset);
    }

    with_endpoint(client, BackendKind::Object, server, |endpoint| {
        endpoint.send(&message)?;
        let mut reply = endpoint.receive()?;
        reply.expect_reply_for(&message)?;

        // Counts first, then the bulk data in operation order.
        let mut counts = Vec::with_capacity(children.len());
        for child in &children {
            let bytes_read = reply.get_8()?;
            if bytes_read > child.length {
                return Err(Error::Protocol(format!(
                    "server read {bytes_read} bytes for a {} byte request",
                    child.length
                )));
            }
            counts.push(bytes_read);
        }
        for (child, bytes_read) in children.iter().zip(counts) {
            if bytes_read == 0 {
                continue;
            }
            let mut buf = vec![0u8; bytes_read as usize];
            endpoint.read_bulk(&mut buf)?;
            child.slot.fill_at(child.fill_pos, &buf);
        }
        Ok(())
    })
}

fn write_group(
    client: &Client,
    semantics: &SemanticsRef,
    server: u32,
    children: Vec<WriteChild>,
) -> Result<()> {
    let _span = trace::enter("object_write");

    if let Some(backend) = client.local_object() {
        let mut first_error = None;
        for child in &children {
            match backend.write(&child.object.backend_handle(), &child.data, child.offset) {
                Ok(n) => child.written.add(n),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if semantics.persistency() == Persistency::Immediate {
            for child in &children {
                if let Err(e) = backend.sync(&child.object.backend_handle()) {
                    first_error.get_or_insert(e);
                }
            }
        }
        return match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        };
    }

    let mut message = Message::with_capacity(MessageOp::ObjectWrite, children.len() * 48);
    message.add_flags(MessageFlags::from_safety(semantics.safety()));
    for child in &children {
        message.add_operation();
        message.append_str(child.object.namespace())?;
        message.append_str(child.object.name())?;
        message.append_8(child.data.len() as u64);
        message.append_8(child.offset);
        message.add_send_data(child.data.clone());
    }

    with_endpoint(client, BackendKind::Object, server, |endpoint| {
        endpoint.send(&message)?;
        if message.flags().wants_reply() {
            let mut reply = endpoint.receive()?;
            reply.expect_reply_for(&message)?;
            for child in &children {
                child.written.add(reply.get_8()?);
            }
        } else {
            // Fire and forget: report the requested length.
            for child in &children {
                child.written.add(child.data.len() as u64);
            }
        }

        if semantics.persistency() == Persistency::Immediate {
            // Trailing sync for the written objects, acknowledged at the
            // storage layer.
            let mut sync = Message::with_capacity(MessageOp::ObjectSync, children.len() * 32);
            sync.add_flags(MessageFlags::SAFETY_NETWORK | MessageFlags::SAFETY_STORAGE);
            for child in &children {
                sync.add_operation();
                sync.append_str(child.object.namespace())?;
                sync.append_str(child.object.name())?;
            }
            endpoint.send(&sync)?;
            let mut reply = endpoint.receive()?;
            reply.expect_reply_for(&sync)?;
            for child in &children {
                let code = ResultCode::from_u32(reply.get_4()?)?;
                code.into_result(&format!(
                    "{}/{}",
                    child.object.namespace(),
                    child.object.name()
                ))?;
            }
        }
        Ok(())
    })
}

/// Run per-server groups, in parallel through the background pool unless
/// ordering is strict. All groups run; the first error wins.
fn fan_out<C, F>(
    client: &Client,
    semantics: &SemanticsRef,
    groups: Vec<(u32, Vec<C>)>,
    run: F,
) -> Result<()>
where
    C: Send + 'static,
    F: Fn(&Client, &SemanticsRef, u32, Vec<C>) -> Result<()> + Clone + Send + 'static,
{
    let mut first_error: Option<Error> = None;

    if semantics.ordering() == OrderingMode::Strict || groups.len() <= 1 {
        for (server, children) in groups {
            if let Err(e) = run(client, semantics, server, children) {
                first_error.get_or_insert(e);
            }
        }
    } else {
        let mut handles = Vec::with_capacity(groups.len());
        for (server, children) in groups {
            let job_client = client.clone();
            let job_semantics = Arc::clone(semantics);
            let job_run = run.clone();
            let submitted = client
                .inner
                .background
                .submit(move || job_run(&job_client, &job_semantics, server, children));
            match submitted {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        for handle in handles {
            if let Err(e) = handle.wait() {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Executor for distributed create/delete/status: one child per server.
pub(crate) fn exec_dist_meta(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    let child_kind = match key.kind {
        ExecKind::DistCreate => ExecKind::ObjectCreate,
        ExecKind::DistDelete => ExecKind::ObjectDelete,
        ExecKind::DistStatus => ExecKind::ObjectStatus,
        _ => unreachable!("dist meta executor received a non-meta kind"),
    };

    let server_count = client.bucket_count(BackendKind::Object);
    let mut per_server: Vec<Vec<Payload>> = (0..server_count).map(|_| Vec::new()).collect();
    for payload in &payloads {
        for server in 0..server_count {
            let child = match payload {
                Payload::DistCreate { object } => Payload::ObjectCreate {
                    object: Object::from_parts(object.namespace(), object.name(), server),
                },
                Payload::DistDelete { object } => Payload::ObjectDelete {
                    object: Object::from_parts(object.namespace(), object.name(), server),
                },
                Payload::DistStatus { object, slot } => Payload::ObjectStatus {
                    object: Object::from_parts(object.namespace(), object.name(), server),
                    slot: slot.clone(),
                },
                _ => unreachable!("dist meta executor received a non-meta payload"),
            };
            per_server[server as usize].push(child);
        }
    }

    let groups: Vec<(u32, Vec<Payload>)> = per_server
        .into_iter()
        .enumerate()
        .filter(|(_, children)| !children.is_empty())
        .map(|(server, children)| (server as u32, children))
        .collect();

    fan_out(
        client,
        semantics,
        groups,
        move |client: &Client, semantics: &SemanticsRef, server: u32, children: Vec<Payload>| {
            let key = OperationKey {
                kind: child_kind,
                server,
                scope: String::new(),
            };
            exec_object_meta(client, semantics, &key, children)
        },
    )
}

/// Executor for distributed reads: stripe, group per server, fan out.
pub(crate) fn exec_dist_read(
    client: &Client,
    semantics: &SemanticsRef,
    payloads: Vec<Payload>,
) -> Result<()> {
    let server_count = client.bucket_count(BackendKind::Object);
    let mut per_server: Vec<Vec<ReadChild>> = (0..server_count).map(|_| Vec::new()).collect();

    for payload in payloads {
        let Payload::DistRead {
            object,
            length,
            offset,
            slot,
        } = payload
        else {
            unreachable!("dist read executor received a non-read payload")
        };
        let mut distribution = object.distribution().clone();
        distribution.reset(length, offset)?;
        while let Some(stripe) = distribution.next() {
            per_server[stripe.server as usize].push(ReadChild {
                object: Object::from_parts(object.namespace(), object.name(), stripe.server),
                length: stripe.length,
                offset: stripe.offset,
                slot: slot.clone(),
                fill_pos: stripe.offset - offset,
            });
        }
    }

    let groups = collect_groups(per_server);
    fan_out(client, semantics, groups, read_group)
}

/// Executor for distributed writes: stripe, group per server, fan out.
pub(crate) fn exec_dist_write(
    client: &Client,
    semantics: &SemanticsRef,
    payloads: Vec<Payload>,
) -> Result<()> {
    let server_count = client.bucket_count(BackendKind::Object);
    let mut per_server: Vec<Vec<WriteChild>> = (0..server_count).map(|_| Vec::new()).collect();

    for payload in payloads {
        let Payload::DistWrite {
            object,
            data,
            offset,
            written,
        } = payload
        else {
            unreachable!("dist write executor received a non-write payload")
        };
        let mut distribution = object.distribution().clone();
        distribution.reset(data.len() as u64, offset)?;
        while let Some(stripe) = distribution.next() {
            let start = (stripe.offset - offset) as usize;
            per_server[stripe.server as usize].push(WriteChild {
                object: Object::from_parts(object.namespace(), object.name(), stripe.server),
                data: data.slice(start..start + stripe.length as usize),
                offset: stripe.offset,
                written: written.clone(),
            });
        }
    }

    let groups = collect_groups(per_server);
    fan_out(client, semantics, groups, write_group)
}

fn collect_groups<C>(per_server: Vec<Vec<C>>) -> Vec<(u32, Vec<C>)> {
    per_server
        .into_iter()
        .enumerate()
        .filter(|(_, children)| !children.is_empty())
        .map(|(server, children)| (server as u32, children))
        .collect()
}
