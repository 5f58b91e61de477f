//! Database schemas

use crate::batch::Batch;
use crate::client::Client;
use crate::db::selector::Selector;
use crate::operation::{ExecKind, OperationKey, Payload};
use parking_lot::Mutex;
use reef_backend::doc;
use reef_core::{types, BackendKind, Document, Error, FieldType, Result};
use std::sync::Arc;

#[derive(Debug)]
struct SchemaState {
    fields: Vec<(String, FieldType)>,
    indices: Vec<Vec<String>>,
    server_side: bool,
}

#[derive(Debug)]
struct SchemaInner {
    namespace: String,
    name: String,
    server: u32,
    state: Mutex<SchemaState>,
}

/// A named, ordered set of typed fields plus index groups.
///
/// A schema is client-side (mutable) until it is queued for creation or
/// fetched from a server; after that its field and index lists are frozen.
#[derive(Clone, Debug)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    /// Reference a schema (namespace, name).
    pub fn new(client: &Client, namespace: &str, name: &str) -> Result<Self> {
        types::validate_name("namespace", namespace)?;
        types::validate_name("schema name", name)?;
        Ok(Self {
            inner: Arc::new(SchemaInner {
                namespace: namespace.to_string(),
                name: name.to_string(),
                server: client.bucket_for(BackendKind::Db, namespace),
                state: Mutex::new(SchemaState {
                    fields: Vec::new(),
                    indices: Vec::new(),
                    server_side: false,
                }),
            }),
        })
    }

    /// The namespace.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The schema name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn server(&self) -> u32 {
        self.inner.server
    }

    /// Whether this schema is an immutable server-side view.
    pub fn is_server_side(&self) -> bool {
        self.inner.state.lock().server_side
    }

    /// Append a typed field. Field order is insertion order.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names and on server-side schemas.
    pub fn add_field(&self, name: &str, ty: FieldType) -> Result<()> {
        types::validate_name("field name", name)?;
        let mut state = self.inner.state.lock();
        if state.server_side {
            return Err(Error::InvalidArgument(
                "schema is server-side and cannot be modified".into(),
            ));
        }
        if state.fields.iter().any(|(n, _)| n == name) {
            return Err(Error::InvalidArgument(format!(
                "duplicate field name: {name}"
            )));
        }
        state.fields.push((name.to_string(), ty));
        Ok(())
    }

    /// Append an index over a set of fields.
    ///
    /// # Errors
    ///
    /// Fails on unknown fields, duplicate indices and server-side schemas.
    pub fn add_index(&self, fields: &[&str]) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::InvalidArgument("index must name fields".into()));
        }
        let mut state = self.inner.state.lock();
        if state.server_side {
            return Err(Error::InvalidArgument(
                "schema is server-side and cannot be modified".into(),
            ));
        }
        for field in fields {
            if !state.fields.iter().any(|(n, _)| n == field) {
                return Err(Error::InvalidArgument(format!(
                    "index references unknown field: {field}"
                )));
            }
        }
        let index: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        if state.indices.contains(&index) {
            return Err(Error::InvalidArgument("duplicate index".into()));
        }
        state.indices.push(index);
        Ok(())
    }

    /// The declared type of a field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.inner
            .state
            .lock()
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    /// The ordered field list.
    pub fn fields(&self) -> Vec<(String, FieldType)> {
        self.inner.state.lock().fields.clone()
    }

    /// The ordered index list.
    pub fn indices(&self) -> Vec<Vec<String>> {
        self.inner.state.lock().indices.clone()
    }

    /// Render the schema document.
    pub(crate) fn to_doc(&self) -> Document {
        let state = self.inner.state.lock();
        doc::build_schema_doc(&state.fields, &state.indices)
    }

    /// Adopt a fetched schema document and freeze.
    pub(crate) fn apply_doc(&self, document: &Document) -> Result<()> {
        let fields = doc::parse_schema_fields(document)?;
        let indices = doc::parse_schema_indices(document)?;
        let mut state = self.inner.state.lock();
        state.fields = fields;
        state.indices = indices;
        state.server_side = true;
        Ok(())
    }

    fn op_key(&self, kind: ExecKind) -> OperationKey {
        OperationKey {
            kind,
            server: self.inner.server,
            scope: self.inner.namespace.clone(),
        }
    }

    /// Queue creation of this schema. The schema freezes immediately; the
    /// server applies it when the batch executes.
    ///
    /// # Errors
    ///
    /// Fails if the schema has no fields or is already server-side.
    pub fn create(&self, batch: &mut Batch) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.server_side {
                return Err(Error::InvalidArgument(
                    "schema is already server-side".into(),
                ));
            }
            if state.fields.is_empty() {
                return Err(Error::InvalidArgument("schema has no fields".into()));
            }
            state.server_side = true;
        }
        batch.add(
            self.op_key(ExecKind::DbSchemaCreate),
            Payload::DbSchemaCreate {
                schema: self.clone(),
            },
        );
        Ok(())
    }

    /// Queue fetching this schema's definition from the server; the field
    /// and index lists fill on execute.
    pub fn fetch(&self, batch: &mut Batch) {
        batch.add(
            self.op_key(ExecKind::DbSchemaGet),
            Payload::DbSchemaGet {
                schema: self.clone(),
            },
        );
    }

    /// Queue deletion of this schema and all its rows.
    pub fn delete(&self, batch: &mut Batch) {
        batch.add(
            self.op_key(ExecKind::DbSchemaDelete),
            Payload::DbSchemaDelete {
                schema: self.clone(),
            },
        );
    }

    /// Queue deletion of all rows matching `selector`.
    pub fn delete_matching(&self, batch: &mut Batch, selector: &mut Selector) -> Result<()> {
        let selector_doc = selector.finalize()?.clone();
        batch.add(
            self.op_key(ExecKind::DbDelete),
            Payload::DbDelete {
                schema: self.clone(),
                selector: selector_doc,
            },
        );
        Ok(())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        if self.inner.namespace != other.inner.namespace || self.inner.name != other.inner.name {
            return false;
        }
        let a = self.inner.state.lock();
        let b = other.inner.state.lock();
        a.fields == b.fields && a.indices == b.indices
    }
}

impl Eq for Schema {}
