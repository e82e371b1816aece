use bson::{Bson, Document as BsonDocument};

use crate::errors::StoreError;

use super::types::{MAX_PATH_DEPTH, UpdateDoc};

/// Applies `upd` in place. Returns whether the document content changed.
///
/// # Errors
/// Returns `UpdateError` when a path crosses a non-document value or `$inc`
/// targets a non-numeric field.
pub fn apply_update(doc: &mut BsonDocument, upd: &UpdateDoc) -> Result<bool, StoreError> {
    let before = doc.clone();
    for (path, value) in &upd.set {
        set_path(doc, path, value.clone())?;
    }
    for (path, delta) in &upd.inc {
        let next = match super::eval::get_path(doc, path) {
            None => delta.clone(),
            Some(current) => add_numbers(current, delta).ok_or_else(|| {
                StoreError::UpdateError(format!("cannot apply $inc to non-numeric field {path}"))
            })?,
        };
        set_path(doc, path, next)?;
    }
    for path in &upd.unset {
        unset_path(doc, path);
    }
    Ok(*doc != before)
}

/// Numeric addition that keeps the narrowest type able to hold the result.
fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    use bson::Bson as T;
    #[allow(clippy::cast_precision_loss)]
    let out = match (a, b) {
        (T::Int32(x), T::Int32(y)) => {
            x.checked_add(*y).map_or_else(|| T::Int64(i64::from(*x) + i64::from(*y)), T::Int32)
        }
        (T::Int32(x), T::Int64(y)) | (T::Int64(y), T::Int32(x)) => {
            let x = i64::from(*x);
            x.checked_add(*y).map_or_else(|| T::Double(x as f64 + *y as f64), T::Int64)
        }
        (T::Int64(x), T::Int64(y)) => {
            x.checked_add(*y).map_or_else(|| T::Double(*x as f64 + *y as f64), T::Int64)
        }
        _ => {
            let x = super::eval::as_f64(a)?;
            let y = super::eval::as_f64(b)?;
            T::Double(x + y)
        }
    };
    Some(out)
}

/// Writes `value` at a dotted path, creating intermediate documents.
///
/// # Errors
/// Returns `UpdateError` if an intermediate segment holds a non-document value.
pub fn set_path(doc: &mut BsonDocument, path: &str, value: Bson) -> Result<(), StoreError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() > MAX_PATH_DEPTH || parts.iter().any(|p| p.is_empty()) {
        return Err(StoreError::UpdateError(format!("invalid field path {path}")));
    }
    let Some((last, parents)) = parts.split_last() else {
        return Err(StoreError::UpdateError("empty field path".into()));
    };
    let mut cur = doc;
    for part in parents {
        if !cur.contains_key(*part) {
            cur.insert(*part, BsonDocument::new());
        }
        cur = match cur.get_mut(*part) {
            Some(Bson::Document(d)) => d,
            _ => {
                return Err(StoreError::UpdateError(format!(
                    "cannot create field {path}: {part} is not a document"
                )));
            }
        };
    }
    cur.insert(*last, value);
    Ok(())
}

/// Removes the value at a dotted path. Missing paths are ignored.
pub fn unset_path(doc: &mut BsonDocument, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else { return };
    let mut cur = doc;
    for part in parents {
        cur = match cur.get_mut(*part) {
            Some(Bson::Document(d)) => d,
            _ => return,
        };
    }
    cur.remove(*last);
}
