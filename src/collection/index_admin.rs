use super::core::{Collection, value_key};
use crate::errors::StoreError;
use crate::query::get_path;
use std::collections::HashMap;

impl Collection {
    // --- Index admin helpers ---

    /// Builds a unique index on `field` from the current rows. Documents
    /// without the field are not indexed.
    ///
    /// # Errors
    /// Returns `DuplicateKey` if existing documents already collide.
    pub fn create_unique_index(&self, field: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        if data.unique.contains_key(field) {
            return Ok(());
        }
        let mut entries = HashMap::with_capacity(data.rows.len());
        for (seq, doc) in &data.rows {
            if let Some(v) = get_path(doc, field) {
                let key = value_key(v);
                if entries.insert(key.clone(), *seq).is_some() {
                    return Err(StoreError::DuplicateKey {
                        collection: self.name().to_string(),
                        field: field.to_string(),
                        key,
                    });
                }
            }
        }
        log::debug!("built unique index {}.{} over {} keys", self.name(), field, entries.len());
        data.unique.insert(field.to_string(), entries);
        Ok(())
    }

    /// Returns whether an index existed.
    pub fn drop_index(&self, field: &str) -> bool {
        self.data.write().unique.remove(field).is_some()
    }

    #[must_use]
    pub fn index_fields(&self) -> Vec<String> {
        self.data.read().unique.keys().cloned().collect()
    }
}
