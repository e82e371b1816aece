use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::types::{CmpOp, Filter, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order, Projection, SortSpec};
use super::update::unset_path;

pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Nin { path, values } => !get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Cmp { path, op: CmpOp::Eq, value } => {
            get_path(doc, path).is_some_and(|v| matches_eq(v, value))
        }
        Filter::Cmp { path, op: CmpOp::Ne, value } => {
            !get_path(doc, path).is_some_and(|v| matches_eq(v, value))
        }
        Filter::Cmp { path, op, value } => {
            get_path(doc, path).is_some_and(|v| matches_range(v, *op, value))
        }
        Filter::Regex { path, regex } => match get_path(doc, path) {
            Some(Bson::String(s)) => regex.is_match(s),
            Some(Bson::Array(items)) => {
                items.iter().any(|b| matches!(b, Bson::String(s) if regex.is_match(s)))
            }
            _ => false,
        },
    }
}

/// Equality with array fan-out: an array field matches when the whole array
/// or any element equals the operand.
fn matches_eq(v: &Bson, q: &Bson) -> bool {
    if values_equal(v, q) {
        return true;
    }
    match v {
        Bson::Array(items) => items.iter().any(|x| values_equal(x, q)),
        _ => false,
    }
}

fn matches_range(v: &Bson, op: CmpOp, q: &Bson) -> bool {
    let test = |x: &Bson| {
        if !comparable(x, q) {
            return false;
        }
        let c = compare_bson(x, q);
        match op {
            CmpOp::Gt => c == Ordering::Greater,
            CmpOp::Gte => c != Ordering::Less,
            CmpOp::Lt => c == Ordering::Less,
            CmpOp::Lte => c != Ordering::Greater,
            CmpOp::Eq | CmpOp::Ne => false,
        }
    };
    match v {
        Bson::Array(items) => items.iter().any(test),
        other => test(other),
    }
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().any(|x| matches_eq(v, x))
}

/// Range operators only compare values of the same type class.
fn comparable(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b)
}

pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return x == y;
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Integer pairs compare exactly; a double on either side compares as `f64`.
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    Some(as_f64(a)?.total_cmp(&as_f64(b)?))
}

fn as_integer(b: &Bson) -> Option<i64> {
    match b {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Resolves a dotted path through nested documents. Numeric segments index arrays.
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = doc.get(first)?;
    for (depth, part) in parts.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

/// Total order over BSON values: numbers compare across types, then by type rank.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    if let Some(ord) = compare_numbers(a, b) {
        return ord;
    }
    match (a, b) {
        (T::String(x), T::String(y)) => x.cmp(y),
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (T::DateTime(x), T::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (T::Array(x), T::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let c = compare_bson(l, r);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        (T::Document(x), T::Document(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let c = lk.cmp(rk).then_with(|| compare_bson(lv, rv));
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::String(_) | T::Symbol(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::MaxKey => 255,
        _ => 11,
    }
}

/// Copies the value at `parts` from `src` into `out`, descending embedded
/// documents only. A path that crosses an array or scalar copies nothing.
fn copy_path(src: &BsonDocument, out: &mut BsonDocument, parts: &[&str]) {
    let Some((head, rest)) = parts.split_first() else { return };
    let Some(value) = src.get(*head) else { return };
    if rest.is_empty() {
        out.insert(*head, value.clone());
        return;
    }
    let Bson::Document(inner) = value else { return };
    if !matches!(out.get(*head), Some(Bson::Document(_))) {
        out.insert(*head, BsonDocument::new());
    }
    if let Some(Bson::Document(slot)) = out.get_mut(*head) {
        copy_path(inner, slot, rest);
    }
}

/// Applies a projection to a copy of `doc`.
///
/// Inclusion paths resolve through embedded documents only, so `"arr.0.k"`
/// projects nothing from an array `arr`.
pub fn project(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    match projection {
        Projection::Include { fields, exclude_id } => {
            let mut out = BsonDocument::new();
            if !exclude_id && let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
            for f in fields {
                let parts: Vec<&str> = f.split('.').collect();
                if parts.len() <= MAX_PATH_DEPTH {
                    copy_path(doc, &mut out, &parts);
                }
            }
            out
        }
        Projection::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                unset_path(&mut out, f);
            }
            out
        }
    }
}
