//! Binding between entity types and their collections.

use bson::DateTime;
use bson::oid::ObjectId;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// An entity persisted in one named collection.
///
/// The repository manages the system fields through the setters: `_id` is
/// assigned on save when absent, `created_at` on save, `updated_at` on save
/// and on every repository-driven update.
pub trait Model: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> Option<ObjectId>;
    fn set_id(&mut self, id: ObjectId);
    fn created_at(&self) -> Option<DateTime>;
    fn set_created_at(&mut self, at: DateTime);
    fn updated_at(&self) -> Option<DateTime>;
    fn set_updated_at(&mut self, at: DateTime);
}

/// Implements [`Model`] for a struct with `id: Option<ObjectId>`,
/// `created_at: Option<DateTime>` and `updated_at: Option<DateTime>` fields.
///
/// ```
/// use bson::{DateTime, oid::ObjectId};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Note {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<ObjectId>,
///     created_at: Option<DateTime>,
///     updated_at: Option<DateTime>,
///     body: String,
/// }
///
/// doclayer::impl_model!(Note, "notes");
/// ```
#[macro_export]
macro_rules! impl_model {
    ($ty:ty, $collection:expr) => {
        impl $crate::model::Model for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> Option<$crate::bson::oid::ObjectId> {
                self.id
            }
            fn set_id(&mut self, id: $crate::bson::oid::ObjectId) {
                self.id = Some(id);
            }
            fn created_at(&self) -> Option<$crate::bson::DateTime> {
                self.created_at
            }
            fn set_created_at(&mut self, at: $crate::bson::DateTime) {
                self.created_at = Some(at);
            }
            fn updated_at(&self) -> Option<$crate::bson::DateTime> {
                self.updated_at
            }
            fn set_updated_at(&mut self, at: $crate::bson::DateTime) {
                self.updated_at = Some(at);
            }
        }
    };
}
