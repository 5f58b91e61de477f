//! Document layouts for db schemas, selectors and rows
//!
//! The structured database exchanges self-describing documents. The field
//! names here are the stable on-wire vocabulary shared by the client-side
//! builders and the backend-side evaluators.
//!
//! Schema document:
//! ```text
//! { "fields": [ { "n": <name>, "t": <type-name> }, ... ],
//!   "idx":    [ [ <field-name>, ... ], ... ] }
//! ```
//!
//! Selector document (absent or empty means "match all"):
//! ```text
//! { "m": "and" | "or",
//!   "s": [ { "f": <field>, "o": <op>, "v": <value> }     -- leaf
//!        | { "m": ..., "s": [ ... ] }                     -- sub-selector
//!        , ... ],
//!   "t": [ <joined schema name>, ... ],                   -- optional
//!   "j": [ { "l": <left field>, "r": <right field> } ] }  -- optional
//! ```
//!
//! Rows are entry documents plus the backend-assigned `"_id"` field.

use reef_core::{Document, Error, FieldType, Result, Value};

/// Schema document: field list.
pub const SCHEMA_FIELDS: &str = "fields";
/// Schema document: index list.
pub const SCHEMA_INDICES: &str = "idx";
/// Field record: name.
pub const FIELD_NAME: &str = "n";
/// Field record: type name.
pub const FIELD_TYPE: &str = "t";

/// Selector document: logical mode.
pub const SELECTOR_MODE: &str = "m";
/// Selector document: children list.
pub const SELECTOR_CHILDREN: &str = "s";
/// Selector leaf: field name.
pub const SELECTOR_FIELD: &str = "f";
/// Selector leaf: comparison operator.
pub const SELECTOR_OP: &str = "o";
/// Selector leaf: literal value.
pub const SELECTOR_VALUE: &str = "v";
/// Selector document: joined schema names.
pub const SELECTOR_TABLES: &str = "t";
/// Selector document: join pairs.
pub const SELECTOR_JOINS: &str = "j";
/// Join pair: left field.
pub const JOIN_LEFT: &str = "l";
/// Join pair: right field.
pub const JOIN_RIGHT: &str = "r";

/// Backend-assigned row id field.
pub const ROW_ID: &str = "_id";

/// Comparison operators usable in selector leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    /// Stable wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        }
    }

    /// Parse a wire spelling.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown comparison operator: {other:?}"
                )))
            }
        })
    }

    /// Evaluate the operator over a typed comparison result.
    ///
    /// `ordering` is `row value` compared to `literal`; `None` means the
    /// values were not comparable (type mismatch, NULL, NaN) and every
    /// operator evaluates to false.
    pub fn matches(&self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            (CompareOp::Lt, Some(Less)) => true,
            (CompareOp::Le, Some(Less | Equal)) => true,
            (CompareOp::Gt, Some(Greater)) => true,
            (CompareOp::Ge, Some(Greater | Equal)) => true,
            (CompareOp::Eq, Some(Equal)) => true,
            (CompareOp::Ne, Some(Less | Greater)) => true,
            _ => false,
        }
    }
}

/// Logical modes for selector nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    /// All children must match
    And,
    /// Any child must match
    Or,
}

impl SelectorMode {
    /// Stable wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorMode::And => "and",
            SelectorMode::Or => "or",
        }
    }

    /// Parse a wire spelling.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "and" => Ok(SelectorMode::And),
            "or" => Ok(SelectorMode::Or),
            other => Err(Error::InvalidArgument(format!(
                "unknown selector mode: {other:?}"
            ))),
        }
    }
}

/// Build a schema document from fields and indices.
pub fn build_schema_doc(fields: &[(String, FieldType)], indices: &[Vec<String>]) -> Document {
    let field_docs = fields
        .iter()
        .map(|(name, ty)| {
            let mut d = Document::new();
            d.insert(FIELD_NAME, Value::Str(name.clone()));
            d.insert(FIELD_TYPE, Value::Str(ty.as_str().to_string()));
            Value::Doc(d)
        })
        .collect();
    let index_docs = indices
        .iter()
        .map(|idx| Value::Array(idx.iter().map(|f| Value::Str(f.clone())).collect()))
        .collect();

    let mut doc = Document::new();
    doc.insert(SCHEMA_FIELDS, Value::Array(field_docs));
    doc.insert(SCHEMA_INDICES, Value::Array(index_docs));
    doc
}

/// Extract the ordered field list from a schema document.
///
/// # Errors
///
/// Returns `Protocol` for malformed documents.
pub fn parse_schema_fields(schema: &Document) -> Result<Vec<(String, FieldType)>> {
    let Value::Array(entries) = schema.require(SCHEMA_FIELDS)? else {
        return Err(Error::Protocol("schema fields must be an array".into()));
    };
    let mut fields = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Doc(d) = entry else {
            return Err(Error::Protocol("schema field must be a document".into()));
        };
        let Value::Str(name) = d.require(FIELD_NAME)? else {
            return Err(Error::Protocol("schema field name must be a string".into()));
        };
        let Value::Str(ty) = d.require(FIELD_TYPE)? else {
            return Err(Error::Protocol("schema field type must be a string".into()));
        };
        fields.push((name.clone(), FieldType::parse(ty)?));
    }
    Ok(fields)
}

/// Extract the index list from a schema document.
pub fn parse_schema_indices(schema: &Document) -> Result<Vec<Vec<String>>> {
    let Some(Value::Array(entries)) = schema.get(SCHEMA_INDICES) else {
        return Ok(Vec::new());
    };
    let mut indices = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Array(names) = entry else {
            return Err(Error::Protocol("schema index must be an array".into()));
        };
        let mut index = Vec::with_capacity(names.len());
        for name in names {
            let Value::Str(name) = name else {
                return Err(Error::Protocol("index field must be a string".into()));
            };
            index.push(name.clone());
        }
        indices.push(index);
    }
    Ok(indices)
}

/// Evaluate a selector document against a row.
///
/// An empty selector matches every row. Missing row fields evaluate as
/// NULL, which no comparison matches.
///
/// # Errors
///
/// Returns `Protocol` for malformed selector documents.
pub fn selector_matches(selector: &Document, row: &Document) -> Result<bool> {
    if selector.is_empty() {
        return Ok(true);
    }
    let mode = match selector.get(SELECTOR_MODE) {
        Some(Value::Str(m)) => SelectorMode::parse(m)?,
        Some(_) => return Err(Error::Protocol("selector mode must be a string".into())),
        None => SelectorMode::And,
    };
    let children = match selector.get(SELECTOR_CHILDREN) {
        Some(Value::Array(c)) => c,
        Some(_) => return Err(Error::Protocol("selector children must be an array".into())),
        None => return Ok(true),
    };

    // Logical combination with short-circuit.
    for child in children {
        let Value::Doc(child) = child else {
            return Err(Error::Protocol("selector child must be a document".into()));
        };
        let matched = if child.get(SELECTOR_FIELD).is_some() {
            leaf_matches(child, row)?
        } else {
            selector_matches(child, row)?
        };
        match mode {
            SelectorMode::And if !matched => return Ok(false),
            SelectorMode::Or if matched => return Ok(true),
            _ => {}
        }
    }
    Ok(mode == SelectorMode::And)
}

fn leaf_matches(leaf: &Document, row: &Document) -> Result<bool> {
    let Value::Str(field) = leaf.require(SELECTOR_FIELD)? else {
        return Err(Error::Protocol("selector field must be a string".into()));
    };
    let Value::Str(op) = leaf.require(SELECTOR_OP)? else {
        return Err(Error::Protocol("selector op must be a string".into()));
    };
    let op = CompareOp::parse(op)?;
    let literal = leaf.require(SELECTOR_VALUE)?;

    let ordering = row
        .get(field)
        .and_then(|actual| actual.compare(literal));
    Ok(op.matches(ordering))
}
