//! Query selectors
//!
//! A selector is a tree whose internal nodes are logical-mode gates (AND,
//! OR) and whose leaves compare one schema field against a literal. The
//! total leaf count across nested sub-selectors is bounded; all referenced
//! fields must belong to the selector's schema or to a schema reachable
//! through an explicit join.
//!
//! A selector is rendered to its wire document at first use and is
//! immutable afterwards.

use crate::db::schema::Schema;
use reef_backend::doc::{self, CompareOp, SelectorMode};
use reef_core::{Document, Error, Result, Value};

/// Maximum number of comparison leaves across the whole tree.
pub const MAX_SELECTOR_LEAVES: usize = 500;

enum SelectorNode {
    Leaf {
        field: String,
        op: CompareOp,
        value: Value,
    },
    Sub(Selector),
}

/// A tree of comparisons filtering the rows of a schema.
pub struct Selector {
    schema: Schema,
    mode: SelectorMode,
    children: Vec<SelectorNode>,
    leaf_count: usize,
    joined: Vec<Schema>,
    joins: Vec<(String, String)>,
    finalized: Option<Document>,
}

impl Selector {
    /// Create an empty selector for a schema with a logical mode.
    pub fn new(schema: &Schema, mode: SelectorMode) -> Self {
        Self {
            schema: schema.clone(),
            mode,
            children: Vec::new(),
            leaf_count: 0,
            joined: Vec::new(),
            joins: Vec::new(),
            finalized: None,
        }
    }

    /// The schema this selector filters.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Total comparison leaves across the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    fn check_mutable(&self) -> Result<()> {
        if self.finalized.is_some() {
            Err(Error::InvalidArgument(
                "selector is finalized and cannot be modified".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn field_known(&self, field: &str) -> bool {
        self.schema.field_type(field).is_some()
            || self.joined.iter().any(|s| s.field_type(field).is_some())
    }

    /// Append a comparison leaf.
    ///
    /// # Errors
    ///
    /// Fails once finalized, for fields outside the schema (and joined
    /// schemas), for literals not matching the declared field type, and
    /// when the leaf bound is exceeded.
    pub fn add_field(&mut self, field: &str, op: CompareOp, value: Value) -> Result<()> {
        self.check_mutable()?;
        if !self.field_known(field) {
            return Err(Error::InvalidArgument(format!(
                "field {field:?} is not in schema {} or its joins",
                self.schema.name()
            )));
        }
        if let Some(ty) = self.schema.field_type(field) {
            if !value.matches(ty) {
                return Err(Error::InvalidArgument(format!(
                    "literal for field {field:?} does not match declared type {ty}"
                )));
            }
        }
        if self.leaf_count + 1 > MAX_SELECTOR_LEAVES {
            return Err(Error::InvalidArgument(format!(
                "selector exceeds {MAX_SELECTOR_LEAVES} leaves"
            )));
        }
        self.leaf_count += 1;
        self.children.push(SelectorNode::Leaf {
            field: field.to_string(),
            op,
            value,
        });
        Ok(())
    }

    /// Append a sub-selector.
    ///
    /// # Errors
    ///
    /// Fails once finalized, when the sub-selector filters an unrelated
    /// schema, and when the combined leaf bound is exceeded.
    pub fn add_selector(&mut self, sub: Selector) -> Result<()> {
        self.check_mutable()?;
        if sub.schema != self.schema && !self.joined.iter().any(|s| *s == sub.schema) {
            return Err(Error::InvalidArgument(
                "sub-selector filters an unrelated schema".into(),
            ));
        }
        if self.leaf_count + sub.leaf_count > MAX_SELECTOR_LEAVES {
            return Err(Error::InvalidArgument(format!(
                "selector exceeds {MAX_SELECTOR_LEAVES} leaves"
            )));
        }
        self.leaf_count += sub.leaf_count;
        self.children.push(SelectorNode::Sub(sub));
        Ok(())
    }

    /// Join another schema so its fields become referencable.
    ///
    /// # Errors
    ///
    /// Fails once finalized or when a join field is unknown.
    pub fn add_join(&mut self, left_field: &str, other: &Schema, right_field: &str) -> Result<()> {
        self.check_mutable()?;
        if self.schema.field_type(left_field).is_none() {
            return Err(Error::InvalidArgument(format!(
                "join field {left_field:?} is not in schema {}",
                self.schema.name()
            )));
        }
        if other.field_type(right_field).is_none() {
            return Err(Error::InvalidArgument(format!(
                "join field {right_field:?} is not in schema {}",
                other.name()
            )));
        }
        self.joined.push(other.clone());
        self.joins
            .push((left_field.to_string(), right_field.to_string()));
        Ok(())
    }

    fn render(&self) -> Document {
        let children = self
            .children
            .iter()
            .map(|child| match child {
                SelectorNode::Leaf { field, op, value } => {
                    let mut leaf = Document::new();
                    leaf.insert(doc::SELECTOR_FIELD, Value::Str(field.clone()));
                    leaf.insert(doc::SELECTOR_OP, Value::Str(op.as_str().to_string()));
                    leaf.insert(doc::SELECTOR_VALUE, value.clone());
                    Value::Doc(leaf)
                }
                SelectorNode::Sub(sub) => Value::Doc(sub.render()),
            })
            .collect();

        let mut document = Document::new();
        document.insert(doc::SELECTOR_MODE, Value::Str(self.mode.as_str().to_string()));
        document.insert(doc::SELECTOR_CHILDREN, Value::Array(children));
        if !self.joined.is_empty() {
            document.insert(
                doc::SELECTOR_TABLES,
                Value::Array(
                    self.joined
                        .iter()
                        .map(|s| Value::Str(s.name().to_string()))
                        .collect(),
                ),
            );
            document.insert(
                doc::SELECTOR_JOINS,
                Value::Array(
                    self.joins
                        .iter()
                        .map(|(l, r)| {
                            let mut join = Document::new();
                            join.insert(doc::JOIN_LEFT, Value::Str(l.clone()));
                            join.insert(doc::JOIN_RIGHT, Value::Str(r.clone()));
                            Value::Doc(join)
                        })
                        .collect(),
                ),
            );
        }
        document
    }

    /// Render the wire document, freezing the selector.
    pub(crate) fn finalize(&mut self) -> Result<&Document> {
        if self.finalized.is_none() {
            self.finalized = Some(self.render());
        }
        Ok(self.finalized.as_ref().unwrap())
    }
}
