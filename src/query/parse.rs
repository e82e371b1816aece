use bson::{Bson, Document};
use regex::RegexBuilder;

use crate::errors::StoreError;

use super::types::{
    CmpOp, Filter, MAX_IN_SET, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Order, Projection,
    SortSpec, UpdateDoc,
};

fn query_err(msg: impl Into<String>) -> StoreError {
    StoreError::QueryError(msg.into())
}

/// Parses a filter expression into a typed tree.
///
/// # Errors
/// Returns `QueryError` for unknown operators, malformed operands or invalid patterns.
pub fn parse_filter(doc: &Document) -> Result<Filter, StoreError> {
    let mut parts = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        parts.push(parse_entry(key, value)?);
    }
    Ok(match parts.len() {
        0 => Filter::True,
        1 => parts.remove(0),
        _ => Filter::And(parts),
    })
}

fn parse_entry(key: &str, value: &Bson) -> Result<Filter, StoreError> {
    match key {
        "$and" => Ok(Filter::And(parse_list(key, value)?)),
        "$or" => Ok(Filter::Or(parse_list(key, value)?)),
        "$nor" => Ok(Filter::Nor(parse_list(key, value)?)),
        k if k.starts_with('$') => Err(query_err(format!("unknown top-level operator {k}"))),
        path => parse_field(path, value),
    }
}

fn parse_list(op: &str, value: &Bson) -> Result<Vec<Filter>, StoreError> {
    let Bson::Array(items) = value else {
        return Err(query_err(format!("{op} requires an array")));
    };
    if items.is_empty() {
        return Err(query_err(format!("{op} requires a non-empty array")));
    }
    items
        .iter()
        .map(|b| match b {
            Bson::Document(d) => parse_filter(d),
            _ => Err(query_err(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn is_operator_doc(d: &Document) -> bool {
    d.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn parse_field(path: &str, value: &Bson) -> Result<Filter, StoreError> {
    match value {
        Bson::Document(d) if is_operator_doc(d) => parse_operators(path, d),
        other => Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: other.clone() }),
    }
}

fn parse_operators(path: &str, ops: &Document) -> Result<Filter, StoreError> {
    let mut parts = Vec::with_capacity(ops.len());
    let regex_options = match ops.get("$options") {
        None => String::new(),
        Some(Bson::String(s)) => s.clone(),
        Some(_) => return Err(query_err("$options must be a string")),
    };
    for (op, operand) in ops {
        let cmp = |op: CmpOp| Filter::Cmp { path: path.to_string(), op, value: operand.clone() };
        let f = match op.as_str() {
            "$eq" => cmp(CmpOp::Eq),
            "$ne" => cmp(CmpOp::Ne),
            "$gt" => cmp(CmpOp::Gt),
            "$gte" => cmp(CmpOp::Gte),
            "$lt" => cmp(CmpOp::Lt),
            "$lte" => cmp(CmpOp::Lte),
            "$in" => Filter::In { path: path.to_string(), values: parse_set(op, operand)? },
            "$nin" => Filter::Nin { path: path.to_string(), values: parse_set(op, operand)? },
            "$exists" => Filter::Exists { path: path.to_string(), exists: truthy(operand) },
            "$regex" => match operand {
                Bson::String(p) => compile_regex(path, p, &regex_options)?,
                _ => return Err(query_err("$regex requires a string pattern")),
            },
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(query_err("$options without $regex"));
                }
                continue;
            }
            "$not" => {
                let inner = match operand {
                    Bson::Document(d) if is_operator_doc(d) => parse_operators(path, d)?,
                    _ => return Err(query_err("$not requires an operator document")),
                };
                Filter::Not(Box::new(inner))
            }
            other => return Err(query_err(format!("unknown operator {other}"))),
        };
        parts.push(f);
    }
    Ok(match parts.len() {
        0 => Filter::True,
        1 => parts.remove(0),
        _ => Filter::And(parts),
    })
}

fn parse_set(op: &str, operand: &Bson) -> Result<Vec<Bson>, StoreError> {
    let Bson::Array(values) = operand else {
        return Err(query_err(format!("{op} requires an array")));
    };
    if values.len() > MAX_IN_SET {
        return Err(query_err(format!("{op} accepts at most {MAX_IN_SET} values")));
    }
    Ok(values.clone())
}

fn truthy(b: &Bson) -> bool {
    match b {
        Bson::Boolean(v) => *v,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn compile_regex(path: &str, pattern: &str, options: &str) -> Result<Filter, StoreError> {
    let mut builder = RegexBuilder::new(pattern);
    for c in options.chars() {
        match c {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            other => return Err(query_err(format!("unsupported regex option {other}"))),
        }
    }
    let regex = builder.build().map_err(|e| query_err(format!("invalid regex: {e}")))?;
    Ok(Filter::Regex { path: path.to_string(), regex })
}

/// Parses an update document made of `$set`, `$unset` and `$inc`.
///
/// # Errors
/// Returns `UpdateError` for replacement-style documents, unknown operators or
/// non-numeric `$inc` operands.
pub fn parse_update(doc: &Document) -> Result<UpdateDoc, StoreError> {
    if doc.is_empty() {
        return Err(StoreError::UpdateError("update document is empty".into()));
    }
    let mut out = UpdateDoc::default();
    for (op, operand) in doc {
        let Bson::Document(fields) = operand else {
            return Err(StoreError::UpdateError(format!("{op} requires a document")));
        };
        match op.as_str() {
            "$set" => {
                out.set.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            "$unset" => out.unset.extend(fields.keys().cloned()),
            "$inc" => {
                for (k, v) in fields {
                    if !matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                        return Err(StoreError::UpdateError(format!("$inc on {k} requires numeric")));
                    }
                    out.inc.push((k.clone(), v.clone()));
                }
            }
            other if other.starts_with('$') => {
                return Err(StoreError::UpdateError(format!("unsupported update operator {other}")));
            }
            other => {
                return Err(StoreError::UpdateError(format!(
                    "update documents may only contain operators, found field {other}"
                )));
            }
        }
    }
    if out.set.iter().any(|(k, _)| k == "_id")
        || out.unset.iter().any(|k| k == "_id")
        || out.inc.iter().any(|(k, _)| k == "_id")
    {
        return Err(StoreError::UpdateError("the _id field is immutable".into()));
    }
    Ok(out)
}

/// Parses a sort document such as `{"age": -1, "name": 1}`.
///
/// # Errors
/// Returns `QueryError` when a direction is not `1` or `-1`.
pub fn parse_sort(doc: &Document) -> Result<Vec<SortSpec>, StoreError> {
    if doc.len() > MAX_SORT_FIELDS {
        return Err(query_err(format!("sort accepts at most {MAX_SORT_FIELDS} fields")));
    }
    doc.iter()
        .map(|(field, dir)| {
            let order = match as_i64(dir) {
                Some(1) => Order::Asc,
                Some(-1) => Order::Desc,
                _ => return Err(query_err(format!("invalid sort direction for {field}"))),
            };
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

/// Parses a projection document. `_id` may be excluded from an inclusion projection.
///
/// # Errors
/// Returns `QueryError` when inclusions and exclusions are mixed.
pub fn parse_projection(doc: &Document) -> Result<Projection, StoreError> {
    if doc.len() > MAX_PROJECTION_FIELDS {
        return Err(query_err(format!("projection accepts at most {MAX_PROJECTION_FIELDS} fields")));
    }
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for (field, flag) in doc {
        if truthy(flag) {
            include.push(field.clone());
        } else {
            exclude.push(field.clone());
        }
    }
    if include.is_empty() {
        return Ok(Projection::Exclude(exclude));
    }
    include.retain(|f| f != "_id");
    match exclude.as_slice() {
        [] => Ok(Projection::Include { fields: include, exclude_id: false }),
        [only] if only == "_id" => Ok(Projection::Include { fields: include, exclude_id: true }),
        _ => Err(query_err("projection cannot mix inclusion and exclusion")),
    }
}

pub(crate) fn as_i64(b: &Bson) -> Option<i64> {
    match b {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

/// # Errors
/// Returns an error if the JSON string is not an object or contains an invalid filter.
pub fn parse_filter_json(json: &str) -> Result<Filter, StoreError> {
    parse_filter(&json_to_document(json)?)
}

/// # Errors
/// Returns an error if the JSON string is not an object or not a valid update.
pub fn parse_update_json(json: &str) -> Result<UpdateDoc, StoreError> {
    parse_update(&json_to_document(json)?)
}

/// Converts a JSON object to a document. JSON integers become `Int64`.
///
/// # Errors
/// Returns an error for malformed JSON or a non-object root.
pub fn json_to_document(json: &str) -> Result<Document, StoreError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    match bson::serialize_to_bson(&value)? {
        Bson::Document(d) => Ok(d),
        _ => Err(query_err("expected a JSON object")),
    }
}

/// Converts a JSON array of stage objects into an aggregation pipeline.
///
/// # Errors
/// Returns an error for malformed JSON or entries that are not objects.
pub fn json_to_pipeline(json: &str) -> Result<Vec<Document>, StoreError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    match bson::serialize_to_bson(&value)? {
        Bson::Array(items) => items
            .into_iter()
            .map(|b| match b {
                Bson::Document(d) => Ok(d),
                _ => Err(query_err("pipeline stages must be objects")),
            })
            .collect(),
        _ => Err(query_err("expected a JSON array of stages")),
    }
}
