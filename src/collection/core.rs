use bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::errors::StoreError;
use crate::query::get_path;

/// Rows, the primary key map and unique indexes of one collection.
///
/// Rows are keyed by an insertion sequence so scans return documents in
/// insertion order.
#[derive(Debug, Default)]
pub(crate) struct CollectionData {
    pub(crate) next_seq: u64,
    pub(crate) rows: BTreeMap<u64, Document>,
    pub(crate) ids: HashMap<String, u64>,
    pub(crate) unique: BTreeMap<String, HashMap<String, u64>>,
}

pub struct Collection {
    name: String,
    pub(crate) data: RwLock<CollectionData>,
}

impl Collection {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), data: RwLock::new(CollectionData::default()) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored document in insertion order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.data.read().rows.values().cloned().collect()
    }
}

/// Canonical key for an indexed value. Numbers that compare equal share a key.
pub(crate) fn value_key(v: &Bson) -> String {
    match v {
        Bson::Int32(i) => format!("n:{i}"),
        Bson::Int64(i) => format!("n:{i}"),
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("n:{}", *f as i64),
        Bson::Double(f) => format!("n:{f}"),
        Bson::String(s) => format!("s:{s}"),
        Bson::ObjectId(oid) => format!("o:{}", oid.to_hex()),
        other => format!("{other:?}"),
    }
}

impl CollectionData {
    pub(crate) fn seq_for_id(&self, id: &Bson) -> Option<u64> {
        self.ids.get(&value_key(id)).copied()
    }

    /// Fails when `doc` would collide on `_id` or a unique field with any row other than `own`.
    pub(crate) fn check_unique(
        &self,
        collection: &str,
        doc: &Document,
        own: Option<u64>,
    ) -> Result<(), StoreError> {
        let clash = |field: &str, key: String, holder: Option<&u64>| match holder {
            Some(seq) if Some(*seq) != own => Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                field: field.to_string(),
                key,
            }),
            _ => Ok(()),
        };
        if let Some(id) = doc.get("_id") {
            let key = value_key(id);
            clash("_id", key.clone(), self.ids.get(&key))?;
        }
        for (field, entries) in &self.unique {
            if let Some(v) = get_path(doc, field) {
                let key = value_key(v);
                clash(field, key.clone(), entries.get(&key))?;
            }
        }
        Ok(())
    }

    pub(crate) fn index_add(&mut self, doc: &Document, seq: u64) {
        if let Some(id) = doc.get("_id") {
            self.ids.insert(value_key(id), seq);
        }
        for (field, entries) in &mut self.unique {
            if let Some(v) = get_path(doc, field) {
                entries.insert(value_key(v), seq);
            }
        }
    }

    pub(crate) fn index_remove(&mut self, doc: &Document) {
        if let Some(id) = doc.get("_id") {
            self.ids.remove(&value_key(id));
        }
        for (field, entries) in &mut self.unique {
            if let Some(v) = get_path(doc, field) {
                entries.remove(&value_key(v));
            }
        }
    }

    /// Inserts a row after checking constraints. `doc` must already carry `_id`.
    pub(crate) fn put_new(&mut self, collection: &str, doc: Document) -> Result<u64, StoreError> {
        self.check_unique(collection, &doc, None)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index_add(&doc, seq);
        self.rows.insert(seq, doc);
        Ok(seq)
    }

    /// Replaces row `seq` with `doc`, keeping indexes consistent. On a
    /// constraint violation the old row stays in place.
    pub(crate) fn put_existing(
        &mut self,
        collection: &str,
        seq: u64,
        doc: Document,
    ) -> Result<(), StoreError> {
        self.check_unique(collection, &doc, Some(seq))?;
        if let Some(old) = self.rows.remove(&seq) {
            self.index_remove(&old);
        }
        self.index_add(&doc, seq);
        self.rows.insert(seq, doc);
        Ok(())
    }

    pub(crate) fn remove(&mut self, seq: u64) -> Option<Document> {
        let old = self.rows.remove(&seq)?;
        self.index_remove(&old);
        Some(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_normalise() {
        assert_eq!(value_key(&Bson::Int32(3)), value_key(&Bson::Int64(3)));
        assert_eq!(value_key(&Bson::Int32(3)), value_key(&Bson::Double(3.0)));
        assert_ne!(value_key(&Bson::Int32(3)), value_key(&Bson::String("3".into())));
    }
}
