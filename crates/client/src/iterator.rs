//! Object and key-value iterators
//!
//! Iteration merges per-server streams: at construction one GET_ALL or
//! GET_BY_PREFIX request is issued per server and the replies are
//! retained; iteration consumes reply entries and moves to the next
//! server's reply when the current one is exhausted (a zero-length entry
//! marks end-of-reply). With a local backend the iterator holds the
//! backend cursor instead.
//!
//! Per-server order is the backend's natural order; no ordering holds
//! across servers. Creating any iterator flushes the operation cache so
//! prior eventually-consistent writes are observable.
//!
//! Replies are received in full at construction, so dropping an
//! unfinished iterator leaves no partial state on any connection.

use crate::client::Client;
use crate::wire::with_endpoint;
use reef_backend::{KvBackend, NameIter, ObjectBackend, PairIter};
use reef_core::{trace, BackendKind, Error, Result};
use reef_net::{Message, MessageOp};
use std::sync::Arc;

enum NameSource {
    Local {
        backend: Arc<dyn ObjectBackend>,
        iter: NameIter,
    },
    Remote {
        replies: Vec<Message>,
        current: usize,
    },
}

/// Iterator over object names in a namespace.
pub struct ObjectIterator {
    source: NameSource,
    finished: bool,
}

impl ObjectIterator {
    /// Iterate all objects of a namespace, optionally restricted to a
    /// name prefix.
    pub fn new(client: &Client, namespace: &str, prefix: Option<&str>) -> Result<Self> {
        let _span = trace::enter("object_iterator");
        client.inner.cache.flush(client)?;

        if let Some(backend) = client.local_object() {
            let iter = match prefix {
                Some(prefix) => backend.get_by_prefix(namespace, prefix)?,
                None => backend.get_all(namespace)?,
            };
            return Ok(Self {
                source: NameSource::Local {
                    backend: Arc::clone(backend),
                    iter,
                },
                finished: false,
            });
        }

        let replies = fetch_replies(
            client,
            BackendKind::Object,
            namespace,
            prefix,
            MessageOp::ObjectGetAll,
            MessageOp::ObjectGetByPrefix,
        )?;
        Ok(Self {
            source: NameSource::Remote {
                replies,
                current: 0,
            },
            finished: false,
        })
    }
}

impl Iterator for ObjectIterator {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match &mut self.source {
            NameSource::Local { backend, iter } => match backend.iterate(iter) {
                Ok(name) => Some(Ok(name)),
                Err(Error::IteratorEnd) => {
                    self.finished = true;
                    None
                }
                Err(e) => {
                    self.finished = true;
                    Some(Err(e))
                }
            },
            NameSource::Remote { replies, current } => loop {
                let Some(reply) = replies.get_mut(*current) else {
                    self.finished = true;
                    return None;
                };
                match reply.get_str() {
                    Ok(name) if name.is_empty() => *current += 1,
                    Ok(name) => return Some(Ok(name)),
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            },
        }
    }
}

enum PairSource {
    Local {
        backend: Arc<dyn KvBackend>,
        iter: PairIter,
    },
    Remote {
        replies: Vec<Message>,
        current: usize,
    },
}

/// Iterator over (key, value) pairs in a namespace.
pub struct KvIterator {
    source: PairSource,
    finished: bool,
}

impl KvIterator {
    /// Iterate all pairs of a namespace, optionally restricted to a key
    /// prefix.
    pub fn new(client: &Client, namespace: &str, prefix: Option<&str>) -> Result<Self> {
        let _span = trace::enter("kv_iterator");
        client.inner.cache.flush(client)?;

        if let Some(backend) = client.local_kv() {
            let iter = match prefix {
                Some(prefix) => backend.get_by_prefix(namespace, prefix)?,
                None => backend.get_all(namespace)?,
            };
            return Ok(Self {
                source: PairSource::Local {
                    backend: Arc::clone(backend),
                    iter,
                },
                finished: false,
            });
        }

        let replies = fetch_replies(
            client,
            BackendKind::Kv,
            namespace,
            prefix,
            MessageOp::KvGetAll,
            MessageOp::KvGetByPrefix,
        )?;
        Ok(Self {
            source: PairSource::Remote {
                replies,
                current: 0,
            },
            finished: false,
        })
    }
}

impl Iterator for KvIterator {
    type Item = Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match &mut self.source {
            PairSource::Local { backend, iter } => match backend.iterate(iter) {
                Ok(pair) => Some(Ok(pair)),
                Err(Error::IteratorEnd) => {
                    self.finished = true;
                    None
                }
                Err(e) => {
                    self.finished = true;
                    Some(Err(e))
                }
            },
            PairSource::Remote { replies, current } => loop {
                let Some(reply) = replies.get_mut(*current) else {
                    self.finished = true;
                    return None;
                };
                match read_pair_entry(reply) {
                    Ok(Some(pair)) => return Some(Ok(pair)),
                    Ok(None) => *current += 1,
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            },
        }
    }
}

/// One `(value_len, value, key\0)` entry; `None` at the zero-length end
/// marker.
fn read_pair_entry(reply: &mut Message) -> Result<Option<(String, Vec<u8>)>> {
    let len = reply.get_4()? as usize;
    if len == 0 {
        return Ok(None);
    }
    let value = reply.get_n(len)?;
    let key = reply.get_str()?;
    Ok(Some((key, value)))
}

/// Issue one listing request per server and collect the replies.
fn fetch_replies(
    client: &Client,
    kind: BackendKind,
    namespace: &str,
    prefix: Option<&str>,
    all_op: MessageOp,
    prefix_op: MessageOp,
) -> Result<Vec<Message>> {
    let count = client.inner.config.server_count(kind);
    let mut replies = Vec::with_capacity(count as usize);
    for server in 0..count {
        let mut request = match prefix {
            Some(_) => Message::new(prefix_op),
            None => Message::new(all_op),
        };
        request.add_operation();
        request.append_str(namespace)?;
        if let Some(prefix) = prefix {
            request.append_str(prefix)?;
        }

        let reply = with_endpoint(client, kind, server, |endpoint| {
            endpoint.send(&request)?;
            let reply = endpoint.receive()?;
            reply.expect_reply_for(&request)?;
            Ok(reply)
        })?;
        replies.push(reply);
    }
    Ok(replies)
}
