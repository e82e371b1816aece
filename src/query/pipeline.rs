use bson::{Bson, Document as BsonDocument};
use std::collections::HashMap;

use crate::context::QueryContext;
use crate::errors::StoreError;

use super::eval::{as_f64, compare_bson, compare_docs, eval_filter, get_path, project, values_equal};
use super::parse::{as_i64, parse_filter, parse_projection, parse_sort};
use super::types::Projection;

fn stage_err(msg: impl Into<String>) -> StoreError {
    StoreError::QueryError(msg.into())
}

/// Runs an aggregation pipeline over `docs`.
///
/// Supported stages: `$match`, `$sort`, `$skip`, `$limit`, `$project`,
/// `$count`, `$group` and `$unset`.
///
/// # Errors
/// Returns `UnsupportedStage` for unknown stages and `QueryError` for malformed ones.
pub fn run_pipeline(
    ctx: &QueryContext,
    mut docs: Vec<BsonDocument>,
    pipeline: &[BsonDocument],
) -> Result<Vec<BsonDocument>, StoreError> {
    for stage in pipeline {
        ctx.check()?;
        let mut entries = stage.iter();
        let (Some((name, body)), None) = (entries.next(), entries.next()) else {
            return Err(stage_err("each pipeline stage must have exactly one key"));
        };
        docs = match name.as_str() {
            "$match" => {
                let filter = parse_filter(as_doc(name, body)?)?;
                docs.into_iter().filter(|d| eval_filter(d, &filter)).collect()
            }
            "$sort" => {
                let sort = parse_sort(as_doc(name, body)?)?;
                docs.sort_by(|a, b| compare_docs(a, b, &sort));
                docs
            }
            "$skip" => {
                let n = as_count(name, body)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = as_count(name, body)?;
                if n == 0 {
                    return Err(stage_err("$limit must be positive"));
                }
                docs.truncate(n);
                docs
            }
            "$project" => {
                let projection = parse_projection(as_doc(name, body)?)?;
                docs.iter().map(|d| project(d, &projection)).collect()
            }
            "$unset" => {
                let fields = match body {
                    Bson::String(s) => vec![s.clone()],
                    Bson::Array(items) => items
                        .iter()
                        .map(|b| match b {
                            Bson::String(s) => Ok(s.clone()),
                            _ => Err(stage_err("$unset entries must be strings")),
                        })
                        .collect::<Result<_, _>>()?,
                    _ => return Err(stage_err("$unset requires a field name or list")),
                };
                let projection = Projection::Exclude(fields);
                docs.iter().map(|d| project(d, &projection)).collect()
            }
            "$count" => {
                let Bson::String(field) = body else {
                    return Err(stage_err("$count requires a field name"));
                };
                if field.is_empty() || field.starts_with('$') || field.contains('.') {
                    return Err(stage_err("invalid $count field name"));
                }
                count_stage(field, docs.len())
            }
            "$group" => group_stage(as_doc(name, body)?, &docs)?,
            other => return Err(StoreError::UnsupportedStage(other.to_string())),
        };
    }
    Ok(docs)
}

fn as_doc<'a>(stage: &str, body: &'a Bson) -> Result<&'a BsonDocument, StoreError> {
    match body {
        Bson::Document(d) => Ok(d),
        _ => Err(stage_err(format!("{stage} requires a document"))),
    }
}

fn as_count(stage: &str, body: &Bson) -> Result<usize, StoreError> {
    as_i64(body)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| stage_err(format!("{stage} requires a non-negative integer")))
}

/// An empty input produces no output document.
fn count_stage(field: &str, n: usize) -> Vec<BsonDocument> {
    if n == 0 {
        return Vec::new();
    }
    let value = i32::try_from(n).map_or_else(
        |_| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)),
        Bson::Int32,
    );
    let mut out = BsonDocument::new();
    out.insert(field, value);
    vec![out]
}

/// Evaluates a group key or accumulator operand: `"$path"` references a
/// field, anything else is a literal.
fn eval_expr(doc: &BsonDocument, expr: &Bson) -> Bson {
    match expr {
        Bson::String(s) if s.starts_with('$') => {
            get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null)
        }
        Bson::Document(d) => {
            let mut out = BsonDocument::new();
            for (k, v) in d {
                out.insert(k.clone(), eval_expr(doc, v));
            }
            Bson::Document(out)
        }
        other => other.clone(),
    }
}

enum Acc {
    Sum(f64, bool),
    Avg(f64, u64),
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Option<Bson>),
    Push(Vec<Bson>),
}

impl Acc {
    fn new(op: &str) -> Result<Self, StoreError> {
        Ok(match op {
            "$sum" => Self::Sum(0.0, true),
            "$avg" => Self::Avg(0.0, 0),
            "$min" => Self::Min(None),
            "$max" => Self::Max(None),
            "$first" => Self::First(None),
            "$last" => Self::Last(None),
            "$push" => Self::Push(Vec::new()),
            other => return Err(stage_err(format!("unknown accumulator {other}"))),
        })
    }

    fn feed(&mut self, v: Bson) {
        match self {
            Self::Sum(total, integral) => {
                if let Some(x) = as_f64(&v) {
                    *total += x;
                    *integral &= !matches!(v, Bson::Double(_));
                }
            }
            Self::Avg(total, n) => {
                if let Some(x) = as_f64(&v) {
                    *total += x;
                    *n += 1;
                }
            }
            Self::Min(cur) => {
                if !matches!(v, Bson::Null)
                    && cur.as_ref().is_none_or(|c| compare_bson(&v, c).is_lt())
                {
                    *cur = Some(v);
                }
            }
            Self::Max(cur) => {
                if !matches!(v, Bson::Null)
                    && cur.as_ref().is_none_or(|c| compare_bson(&v, c).is_gt())
                {
                    *cur = Some(v);
                }
            }
            Self::First(cur) => {
                if cur.is_none() {
                    *cur = Some(v);
                }
            }
            Self::Last(cur) => *cur = Some(v),
            Self::Push(items) => items.push(v),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum(total, true) if total.abs() < 9.0e15 => {
                let n = total as i64;
                i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32)
            }
            Self::Sum(total, _) => Bson::Double(total),
            Self::Avg(_, 0) => Bson::Null,
            Self::Avg(total, n) => Bson::Double(total / n as f64),
            Self::Min(v) | Self::Max(v) | Self::First(v) | Self::Last(v) => v.unwrap_or(Bson::Null),
            Self::Push(items) => Bson::Array(items),
        }
    }
}

fn group_stage(body: &BsonDocument, docs: &[BsonDocument]) -> Result<Vec<BsonDocument>, StoreError> {
    let Some(id_expr) = body.get("_id") else {
        return Err(stage_err("$group requires an _id expression"));
    };
    let mut fields = Vec::new();
    for (name, acc) in body.iter().filter(|(k, _)| k.as_str() != "_id") {
        let Bson::Document(acc) = acc else {
            return Err(stage_err(format!("accumulator for {name} must be a document")));
        };
        let mut entries = acc.iter();
        let (Some((op, operand)), None) = (entries.next(), entries.next()) else {
            return Err(stage_err(format!("accumulator for {name} must have one operator")));
        };
        Acc::new(op)?;
        fields.push((name.clone(), op.clone(), operand.clone()));
    }

    // Groups keep first-seen order; keys are bucketed by a canonical string.
    let mut order: Vec<(Bson, Vec<Acc>)> = Vec::new();
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for doc in docs {
        let key = eval_expr(doc, id_expr);
        let bucket = index.entry(format!("{key:?}")).or_default();
        let slot = match bucket.iter().copied().find(|&i| values_equal(&order[i].0, &key)) {
            Some(i) => i,
            None => {
                let accs = fields.iter().map(|(_, op, _)| Acc::new(op)).collect::<Result<_, _>>()?;
                order.push((key, accs));
                bucket.push(order.len() - 1);
                order.len() - 1
            }
        };
        for (acc, (_, _, operand)) in order[slot].1.iter_mut().zip(&fields) {
            acc.feed(eval_expr(doc, operand));
        }
    }

    Ok(order
        .into_iter()
        .map(|(key, accs)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            for ((name, _, _), acc) in fields.iter().zip(accs) {
                out.insert(name.clone(), acc.finish());
            }
            out
        })
        .collect())
}
