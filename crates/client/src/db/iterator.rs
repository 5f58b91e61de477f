//! Database query iterator

use crate::client::Client;
use crate::db::schema::Schema;
use crate::db::selector::Selector;
use crate::wire::with_endpoint;
use reef_backend::doc::ROW_ID;
use reef_backend::{DbBackend, RowIter};
use reef_core::{trace, BackendKind, Document, Error, Result, Value};
use reef_net::{Message, MessageOp};
use std::sync::Arc;

/// One row produced by a query, in schema-declared field order.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    doc: Document,
}

impl DbRow {
    /// The value of a field, `Value::Null` for unset fields.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.doc.get(field)
    }

    /// The backend-assigned row id.
    pub fn id(&self) -> Option<u64> {
        match self.doc.get(ROW_ID) {
            Some(Value::Id(id)) => Some(*id),
            _ => None,
        }
    }

    /// The underlying row document.
    pub fn doc(&self) -> &Document {
        &self.doc
    }
}

enum RowSource {
    Local {
        backend: Arc<dyn DbBackend>,
        iter: RowIter,
    },
    Buffered {
        rows: std::vec::IntoIter<Document>,
    },
}

/// Iterator over the rows matching a selector.
///
/// Construction flushes the operation cache and executes the query; with
/// a remote server the matching rows are buffered from the reply, so
/// dropping an unfinished iterator leaves no state on the connection.
pub struct DbIterator {
    source: RowSource,
    finished: bool,
}

impl DbIterator {
    /// Query `schema` with an optional selector (`None` matches all rows).
    pub fn new(client: &Client, schema: &Schema, selector: Option<&mut Selector>) -> Result<Self> {
        let _span = trace::enter("db_iterator");
        client.inner.cache.flush(client)?;

        let selector_doc = match selector {
            Some(selector) => selector.finalize()?.clone(),
            None => Document::new(),
        };

        if let Some(backend) = client.local_db() {
            let mut batch = backend.batch_start(
                schema.namespace(),
                &reef_core::semantics::Semantics::default(),
            )?;
            let iter = backend.query(&mut batch, schema.name(), &selector_doc)?;
            backend.batch_execute(batch)?;
            return Ok(Self {
                source: RowSource::Local {
                    backend: Arc::clone(backend),
                    iter,
                },
                finished: false,
            });
        }

        let mut request = Message::new(MessageOp::DbQuery);
        request.add_operation();
        request.append_str(schema.namespace())?;
        request.append_str(schema.name())?;
        request.append_doc(&selector_doc)?;

        let rows = with_endpoint(client, BackendKind::Db, schema.server(), |endpoint| {
            endpoint.send(&request)?;
            let mut reply = endpoint.receive()?;
            reply.expect_reply_for(&request)?;

            let mut rows = Vec::new();
            loop {
                match reply.get_4()? {
                    0 => break,
                    1 => rows.push(reply.get_doc()?),
                    other => {
                        return Err(Error::Protocol(format!(
                            "unexpected row marker: {other}"
                        )))
                    }
                }
            }
            Ok(rows)
        })?;

        Ok(Self {
            source: RowSource::Buffered {
                rows: rows.into_iter(),
            },
            finished: false,
        })
    }
}

impl Iterator for DbIterator {
    type Item = Result<DbRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match &mut self.source {
            RowSource::Local { backend, iter } => match backend.iterate(iter) {
                Ok(doc) => Some(Ok(DbRow { doc })),
                Err(Error::IteratorEnd) => {
                    self.finished = true;
                    None
                }
                Err(e) => {
                    self.finished = true;
                    Some(Err(e))
                }
            },
            RowSource::Buffered { rows } => match rows.next() {
                Some(doc) => Some(Ok(DbRow { doc })),
                None => {
                    self.finished = true;
                    None
                }
            },
        }
    }
}
