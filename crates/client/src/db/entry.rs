//! Database entries

use crate::batch::Batch;
use crate::db::schema::Schema;
use crate::db::selector::Selector;
use crate::operation::{ExecKind, OperationKey, Payload};
use parking_lot::Mutex;
use reef_core::{Document, Error, Result, Value};
use std::sync::Arc;

/// Result slot for an insert: the backend-assigned row id.
#[derive(Debug, Clone, Default)]
pub struct IdSlot(Arc<Mutex<Option<u64>>>);

impl IdSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, id: u64) {
        *self.0.lock() = Some(id);
    }

    /// The assigned row id, available once the batch executed.
    pub fn id(&self) -> Option<u64> {
        *self.0.lock()
    }
}

/// A typed value map for one row of a schema.
///
/// Set fields must be a subset of the schema's fields; unset fields are
/// NULL on insert.
pub struct Entry {
    schema: Schema,
    values: Document,
}

impl Entry {
    /// Create an empty entry for a schema.
    pub fn new(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
            values: Document::new(),
        }
    }

    /// The schema this entry belongs to.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Set a field, type-checked against the schema.
    ///
    /// # Errors
    ///
    /// Fails for unknown fields and type mismatches.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        let Some(ty) = self.schema.field_type(field) else {
            return Err(Error::InvalidArgument(format!(
                "field {field:?} is not in schema {}",
                self.schema.name()
            )));
        };
        if !value.matches(ty) {
            return Err(Error::InvalidArgument(format!(
                "value for field {field:?} does not match declared type {ty}"
            )));
        }
        self.values.insert(field, value);
        Ok(())
    }

    pub(crate) fn values(&self) -> &Document {
        &self.values
    }

    fn op_key(&self, kind: ExecKind) -> OperationKey {
        OperationKey {
            kind,
            server: self.schema.server(),
            scope: self.schema.namespace().to_string(),
        }
    }

    /// Queue inserting this entry as a new row; the slot holds the
    /// assigned row id once the batch executed.
    pub fn insert(self, batch: &mut Batch) -> IdSlot {
        let id = IdSlot::new();
        batch.add(
            self.op_key(ExecKind::DbInsert),
            Payload::DbInsert {
                entry: self,
                id: id.clone(),
            },
        );
        id
    }

    /// Queue updating all rows matching `selector` with this entry's set
    /// fields.
    pub fn update(self, batch: &mut Batch, selector: &mut Selector) -> Result<()> {
        let selector_doc = selector.finalize()?.clone();
        let key = self.op_key(ExecKind::DbUpdate);
        batch.add(
            key,
            Payload::DbUpdate {
                schema: self.schema.clone(),
                selector: selector_doc,
                entry: self.values,
            },
        );
        Ok(())
    }
}
