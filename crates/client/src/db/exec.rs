//! Executor for database operation groups
//!
//! A group holds operations of one kind for one namespace; the namespace
//! decides the server bucket and the backend batch.

use crate::client::Client;
use crate::operation::{ExecKind, OperationKey, Payload};
use crate::wire::with_endpoint;
use reef_backend::doc::ROW_ID;
use reef_backend::DbBackend;
use reef_core::semantics::SemanticsRef;
use reef_core::{trace, BackendKind, Error, Result, Value};
use reef_net::{Message, MessageOp, ResultCode};
use std::sync::Arc;

pub(crate) fn exec_db(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    let _span = trace::enter("db");

    if let Some(backend) = client.local_db() {
        return local_db(backend, semantics, key, &payloads);
    }

    let op = match key.kind {
        ExecKind::DbSchemaCreate => MessageOp::DbSchemaCreate,
        ExecKind::DbSchemaGet => MessageOp::DbSchemaGet,
        ExecKind::DbSchemaDelete => MessageOp::DbSchemaDelete,
        ExecKind::DbInsert => MessageOp::DbInsert,
        ExecKind::DbUpdate => MessageOp::DbUpdate,
        ExecKind::DbDelete => MessageOp::DbDelete,
        _ => unreachable!("db executor received a non-db kind"),
    };

    let mut message = Message::with_capacity(op, payloads.len() * 64);
    for payload in &payloads {
        message.add_operation();
        match payload {
            Payload::DbSchemaCreate { schema } => {
                message.append_str(schema.namespace())?;
                message.append_str(schema.name())?;
                message.append_doc(&schema.to_doc())?;
            }
            Payload::DbSchemaGet { schema } | Payload::DbSchemaDelete { schema } => {
                message.append_str(schema.namespace())?;
                message.append_str(schema.name())?;
            }
            Payload::DbInsert { entry, .. } => {
                message.append_str(entry.schema().namespace())?;
                message.append_str(entry.schema().name())?;
                message.append_doc(entry.values())?;
            }
            Payload::DbUpdate {
                schema,
                selector,
                entry,
            } => {
                message.append_str(schema.namespace())?;
                message.append_str(schema.name())?;
                message.append_doc(selector)?;
                message.append_doc(entry)?;
            }
            Payload::DbDelete { schema, selector } => {
                message.append_str(schema.namespace())?;
                message.append_str(schema.name())?;
                message.append_doc(selector)?;
            }
            _ => unreachable!("db executor received a non-db payload"),
        }
    }

    // Database operations are request/reply: ids and fetched schemas come
    // back in the reply regardless of the safety aspect.
    let per_op_error = with_endpoint(client, BackendKind::Db, key.server, |endpoint| {
        endpoint.send(&message)?;
        let mut reply = endpoint.receive()?;
        reply.expect_reply_for(&message)?;

        let mut first_error = None;
        for payload in &payloads {
            let code = ResultCode::from_u32(reply.get_4()?)?;
            match payload {
                Payload::DbSchemaGet { schema } => {
                    let context = format!("{}/{}", schema.namespace(), schema.name());
                    match code.into_result(&context) {
                        Ok(()) => {
                            let document = reply.get_doc()?;
                            if let Err(e) = schema.apply_doc(&document) {
                                first_error.get_or_insert(e);
                            }
                        }
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                Payload::DbInsert { entry, id } => {
                    let context =
                        format!("{}/{}", entry.schema().namespace(), entry.schema().name());
                    match code.into_result(&context) {
                        Ok(()) => {
                            let id_doc = reply.get_doc()?;
                            match id_doc.get(ROW_ID) {
                                Some(Value::Id(assigned)) => id.set(*assigned),
                                _ => {
                                    first_error.get_or_insert(Error::Protocol(
                                        "insert reply carries no row id".into(),
                                    ));
                                }
                            }
                        }
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                Payload::DbSchemaCreate { schema }
                | Payload::DbSchemaDelete { schema }
                | Payload::DbUpdate { schema, .. }
                | Payload::DbDelete { schema, .. } => {
                    let context = format!("{}/{}", schema.namespace(), schema.name());
                    if let Err(e) = code.into_result(&context) {
                        first_error.get_or_insert(e);
                    }
                }
                _ => unreachable!("db executor received a non-db payload"),
            }
        }
        Ok(first_error)
    })?;

    match per_op_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn local_db(
    backend: &Arc<dyn DbBackend>,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: &[Payload],
) -> Result<()> {
    let mut batch = backend.batch_start(&key.scope, semantics)?;
    let mut first_error = None;

    for payload in payloads {
        let result = match payload {
            Payload::DbSchemaCreate { schema } => {
                backend.schema_create(&mut batch, schema.name(), &schema.to_doc())
            }
            Payload::DbSchemaGet { schema } => backend
                .schema_get(&mut batch, schema.name())
                .and_then(|document| schema.apply_doc(&document)),
            Payload::DbSchemaDelete { schema } => backend.schema_delete(&mut batch, schema.name()),
            Payload::DbInsert { entry, id } => backend
                .insert(&mut batch, entry.schema().name(), entry.values())
                .and_then(|id_doc| match id_doc.get(ROW_ID) {
                    Some(Value::Id(assigned)) => {
                        id.set(*assigned);
                        Ok(())
                    }
                    _ => Err(Error::Protocol("insert reply carries no row id".into())),
                }),
            Payload::DbUpdate {
                schema,
                selector,
                entry,
            } => backend.update(&mut batch, schema.name(), selector, entry),
            Payload::DbDelete { schema, selector } => {
                backend.delete(&mut batch, schema.name(), selector)
            }
            _ => unreachable!("db executor received a non-db payload"),
        };
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    if let Err(e) = backend.batch_execute(batch) {
        first_error.get_or_insert(e);
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
