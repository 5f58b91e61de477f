//! In-memory structured database backend
//!
//! Stores schema documents and row documents per namespace and evaluates
//! selector documents over the rows. Entry fields are type-checked against
//! the schema on insert and update.

use crate::doc::{self, ROW_ID};
use crate::{DbBackend, DbBatch, RowIter};
use dashmap::DashMap;
use parking_lot::RwLock;
use reef_core::semantics::{Atomicity, Semantics};
use reef_core::{Document, Error, FieldType, Result, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

struct StoredSchema {
    doc: Document,
    fields: Vec<(String, FieldType)>,
    rows: Vec<Document>,
    next_id: u64,
}

type Namespace = Arc<RwLock<BTreeMap<String, StoredSchema>>>;

/// Database backend keeping everything in process memory.
///
/// Operations apply immediately; `batch_execute` is a barrier.
#[derive(Default)]
pub struct MemoryDbBackend {
    namespaces: DashMap<String, Namespace>,
}

impl MemoryDbBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self, namespace: &str) -> Namespace {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }
}

/// Check an entry's fields against the schema's declared types.
fn check_entry(fields: &[(String, FieldType)], entry: &Document) -> Result<()> {
    for (name, value) in entry.iter() {
        if name == ROW_ID {
            continue;
        }
        let Some((_, ty)) = fields.iter().find(|(n, _)| n == name) else {
            return Err(Error::InvalidArgument(format!(
                "entry field {name:?} is not in the schema"
            )));
        };
        if !value.matches(*ty) {
            return Err(Error::InvalidArgument(format!(
                "entry field {name:?} does not match declared type {ty}"
            )));
        }
    }
    Ok(())
}

impl DbBackend for MemoryDbBackend {
    fn batch_start(&self, namespace: &str, semantics: &Semantics) -> Result<DbBatch> {
        Ok(DbBatch {
            namespace: namespace.to_string(),
            atomic: semantics.atomicity() == Atomicity::Batch,
        })
    }

    fn batch_execute(&self, _batch: DbBatch) -> Result<()> {
        Ok(())
    }

    fn schema_create(&self, batch: &mut DbBatch, name: &str, schema: &Document) -> Result<()> {
        let fields = doc::parse_schema_fields(schema)?;
        let ns = self.namespace(&batch.namespace);
        let mut schemas = ns.write();
        if schemas.contains_key(name) {
            return Err(Error::Exists(format!("{}/{name}", batch.namespace)));
        }
        schemas.insert(
            name.to_string(),
            StoredSchema {
                doc: schema.clone(),
                fields,
                rows: Vec::new(),
                next_id: 1,
            },
        );
        Ok(())
    }

    fn schema_get(&self, batch: &mut DbBatch, name: &str) -> Result<Document> {
        let ns = self.namespace(&batch.namespace);
        let schemas = ns.read();
        schemas
            .get(name)
            .map(|s| s.doc.clone())
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", batch.namespace)))
    }

    fn schema_delete(&self, batch: &mut DbBatch, name: &str) -> Result<()> {
        let ns = self.namespace(&batch.namespace);
        let result = ns
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", batch.namespace)));
        result
    }

    fn insert(&self, batch: &mut DbBatch, name: &str, entry: &Document) -> Result<Document> {
        let ns = self.namespace(&batch.namespace);
        let mut schemas = ns.write();
        let schema = schemas
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", batch.namespace)))?;
        check_entry(&schema.fields, entry)?;

        let id = schema.next_id;
        schema.next_id += 1;

        // Store the row in schema-declared field order; unset fields are NULL.
        let mut row = Document::new();
        for (field, _) in &schema.fields {
            let value = entry.get(field).cloned().unwrap_or(Value::Null);
            row.insert(field.clone(), value);
        }
        row.insert(ROW_ID, Value::Id(id));
        schema.rows.push(row);

        let mut id_doc = Document::new();
        id_doc.insert(ROW_ID, Value::Id(id));
        Ok(id_doc)
    }

    fn update(
        &self,
        batch: &mut DbBatch,
        name: &str,
        selector: &Document,
        entry: &Document,
    ) -> Result<()> {
        let ns = self.namespace(&batch.namespace);
        let mut schemas = ns.write();
        let schema = schemas
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", batch.namespace)))?;
        check_entry(&schema.fields, entry)?;

        for row in schema.rows.iter_mut() {
            if doc::selector_matches(selector, row)? {
                for (field, value) in entry.iter() {
                    if field != ROW_ID {
                        row.insert(field, value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn delete(&self, batch: &mut DbBatch, name: &str, selector: &Document) -> Result<()> {
        let ns = self.namespace(&batch.namespace);
        let mut schemas = ns.write();
        let schema = schemas
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", batch.namespace)))?;

        let mut failed = None;
        schema.rows.retain(|row| {
            if failed.is_some() {
                return true;
            }
            match doc::selector_matches(selector, row) {
                Ok(matched) => !matched,
                Err(e) => {
                    failed = Some(e);
                    true
                }
            }
        });
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn query(&self, batch: &mut DbBatch, name: &str, selector: &Document) -> Result<RowIter> {
        let ns = self.namespace(&batch.namespace);
        let schemas = ns.read();
        let schema = schemas
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", batch.namespace)))?;

        let mut matched = Vec::new();
        for row in &schema.rows {
            if doc::selector_matches(selector, row)? {
                matched.push(row.clone());
            }
        }
        Ok(RowIter(Box::new(matched.into_iter())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{CompareOp, SelectorMode};
    use reef_core::semantics::Template;

    fn batch(backend: &MemoryDbBackend, ns: &str) -> DbBatch {
        backend
            .batch_start(ns, &Semantics::new(Template::Default))
            .unwrap()
    }

    fn variables_schema() -> Document {
        doc::build_schema_doc(
            &[
                ("file".to_string(), FieldType::String),
                ("name".to_string(), FieldType::String),
                ("min".to_string(), FieldType::Float64),
                ("max".to_string(), FieldType::Float64),
            ],
            &[vec!["file".to_string()]],
        )
    }

    fn entry(file: &str, name: &str, min: f64, max: f64) -> Document {
        let mut e = Document::new();
        e.insert("file", Value::Str(file.into()));
        e.insert("name", Value::Str(name.into()));
        e.insert("min", Value::F64(min));
        e.insert("max", Value::F64(max));
        e
    }

    fn file_selector(file: &str) -> Document {
        let mut leaf = Document::new();
        leaf.insert(doc::SELECTOR_FIELD, Value::Str("file".into()));
        leaf.insert(doc::SELECTOR_OP, Value::Str(CompareOp::Eq.as_str().into()));
        leaf.insert(doc::SELECTOR_VALUE, Value::Str(file.into()));

        let mut sel = Document::new();
        sel.insert(doc::SELECTOR_MODE, Value::Str(SelectorMode::And.as_str().into()));
        sel.insert(doc::SELECTOR_CHILDREN, Value::Array(vec![Value::Doc(leaf)]));
        sel
    }

    #[test]
    fn schema_lifecycle() {
        let backend = MemoryDbBackend::new();
        let mut b = batch(&backend, "adios2");

        backend
            .schema_create(&mut b, "variables", &variables_schema())
            .unwrap();
        assert!(matches!(
            backend
                .schema_create(&mut b, "variables", &variables_schema())
                .unwrap_err(),
            Error::Exists(_)
        ));

        let fetched = backend.schema_get(&mut b, "variables").unwrap();
        assert_eq!(doc::parse_schema_fields(&fetched).unwrap().len(), 4);

        backend.schema_delete(&mut b, "variables").unwrap();
        assert!(backend
            .schema_get(&mut b, "variables")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn insert_and_query_by_selector() {
        let backend = MemoryDbBackend::new();
        let mut b = batch(&backend, "adios2");
        backend
            .schema_create(&mut b, "variables", &variables_schema())
            .unwrap();

        let id1 = backend
            .insert(&mut b, "variables", &entry("demo.bp", "temperature", 1.0, 42.0))
            .unwrap();
        let id2 = backend
            .insert(&mut b, "variables", &entry("demo.bp", "pressure", 0.5, 10.0))
            .unwrap();
        backend
            .insert(&mut b, "variables", &entry("other.bp", "temperature", 2.0, 3.0))
            .unwrap();
        assert_ne!(id1.get(ROW_ID), id2.get(ROW_ID));

        let mut iter = backend
            .query(&mut b, "variables", &file_selector("demo.bp"))
            .unwrap();
        let row1 = backend.iterate(&mut iter).unwrap();
        let row2 = backend.iterate(&mut iter).unwrap();
        assert!(backend.iterate(&mut iter).unwrap_err().is_iterator_end());

        // rows come back in schema-declared field order
        let names: Vec<_> = row1.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["file", "name", "min", "max", ROW_ID]);
        assert_eq!(row1.get("name"), Some(&Value::Str("temperature".into())));
        assert_eq!(row2.get("name"), Some(&Value::Str("pressure".into())));
    }

    #[test]
    fn update_and_delete_by_selector() {
        let backend = MemoryDbBackend::new();
        let mut b = batch(&backend, "adios2");
        backend
            .schema_create(&mut b, "variables", &variables_schema())
            .unwrap();
        backend
            .insert(&mut b, "variables", &entry("demo.bp", "temperature", 1.0, 42.0))
            .unwrap();
        backend
            .insert(&mut b, "variables", &entry("other.bp", "pressure", 0.5, 10.0))
            .unwrap();

        let mut patch = Document::new();
        patch.insert("max", Value::F64(99.0));
        backend
            .update(&mut b, "variables", &file_selector("demo.bp"), &patch)
            .unwrap();

        let mut iter = backend
            .query(&mut b, "variables", &file_selector("demo.bp"))
            .unwrap();
        let row = backend.iterate(&mut iter).unwrap();
        assert_eq!(row.get("max"), Some(&Value::F64(99.0)));

        backend
            .delete(&mut b, "variables", &file_selector("demo.bp"))
            .unwrap();
        let mut iter = backend
            .query(&mut b, "variables", &Document::new())
            .unwrap();
        let rest = backend.iterate(&mut iter).unwrap();
        assert_eq!(rest.get("file"), Some(&Value::Str("other.bp".into())));
        assert!(backend.iterate(&mut iter).unwrap_err().is_iterator_end());
    }

    #[test]
    fn insert_rejects_unknown_and_mistyped_fields() {
        let backend = MemoryDbBackend::new();
        let mut b = batch(&backend, "adios2");
        backend
            .schema_create(&mut b, "variables", &variables_schema())
            .unwrap();

        let mut bad = Document::new();
        bad.insert("bogus", Value::I32(1));
        assert!(backend.insert(&mut b, "variables", &bad).is_err());

        let mut mistyped = Document::new();
        mistyped.insert("min", Value::Str("not a float".into()));
        assert!(backend.insert(&mut b, "variables", &mistyped).is_err());
    }

    #[test]
    fn unset_fields_are_null() {
        let backend = MemoryDbBackend::new();
        let mut b = batch(&backend, "adios2");
        backend
            .schema_create(&mut b, "variables", &variables_schema())
            .unwrap();

        let mut partial = Document::new();
        partial.insert("file", Value::Str("demo.bp".into()));
        backend.insert(&mut b, "variables", &partial).unwrap();

        let mut iter = backend
            .query(&mut b, "variables", &Document::new())
            .unwrap();
        let row = backend.iterate(&mut iter).unwrap();
        assert_eq!(row.get("name"), Some(&Value::Null));
        assert_eq!(row.get("min"), Some(&Value::Null));
    }
}
