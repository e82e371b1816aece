//! Generic CRUD repository over a [`DocumentStore`].
//!
//! One `BaseRepository` serves every entity type: each operation is generic
//! over a [`Model`], whose `COLLECTION` selects the backing collection.
//! Backend failures surface as [`RepositoryError::Persistence`] exactly once;
//! nothing is retried.

mod paginate;

use bson::oid::ObjectId;
use bson::{Bson, DateTime, Document, doc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::context::QueryContext;
use crate::errors::RepositoryError;
use crate::model::Model;
use crate::query::{
    AggregateOptions, BulkWriteOptions, BulkWriteResult, Cursor, DeleteResult,
    FindOneAndUpdateOptions, FindOptions, UpdateResult, WriteModel,
};
use crate::store::DocumentStore;

/// A typed write inside [`BaseRepository::bulk_write`].
#[derive(Debug, Clone)]
pub enum BulkOperation<M> {
    Insert(M),
    UpdateOne { filter: Document, update: Document, upsert: bool },
    UpdateMany { filter: Document, update: Document },
    Replace { filter: Document, replacement: M, upsert: bool },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
}

#[derive(Clone)]
pub struct BaseRepository {
    store: Arc<dyn DocumentStore>,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for BaseRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseRepository")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) fn to_document<M: Model>(model: &M) -> Result<Document, RepositoryError> {
    Ok(bson::serialize_to_document(model)?)
}

pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> Result<T, RepositoryError> {
    Ok(bson::deserialize_from_document(doc)?)
}

/// Decodes every document. The cursor is released on every path.
fn decode_all<T: DeserializeOwned>(cursor: Cursor) -> Result<Vec<T>, RepositoryError> {
    let mut out = Vec::with_capacity(cursor.remaining());
    for doc in cursor {
        out.push(decode(doc)?);
    }
    Ok(out)
}

/// Parses a 24-hex-digit identifier.
///
/// # Errors
/// `InvalidIdentifier` for anything else.
pub fn parse_object_id(id: &str) -> Result<ObjectId, RepositoryError> {
    ObjectId::parse_str(id).map_err(|_| RepositoryError::InvalidIdentifier(id.to_string()))
}

impl BaseRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, default_timeout: None }
    }

    /// Bounds every [`BaseRepository::context`] by `timeout`.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fresh context honouring the configured default timeout.
    #[must_use]
    pub fn context(&self) -> QueryContext {
        self.default_timeout.map_or_else(QueryContext::background, QueryContext::with_timeout)
    }

    /// Fresh context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> QueryContext {
        QueryContext::with_timeout(timeout)
    }

    fn stamp_new<M: Model>(model: &mut M) {
        let now = DateTime::now();
        if model.id().is_none() {
            model.set_id(ObjectId::new());
        }
        model.set_created_at(now);
        model.set_updated_at(now);
    }

    /// Inserts `model` as a new document, filling `_id` (when absent),
    /// `created_at` and `updated_at`.
    ///
    /// # Errors
    /// `Persistence` on a duplicate key or store failure.
    pub fn save<M: Model>(&self, ctx: &QueryContext, model: &mut M) -> Result<(), RepositoryError> {
        Self::stamp_new(model);
        let doc = to_document(model)?;
        self.store.insert_one(ctx, M::COLLECTION, doc)?;
        log::debug!("saved {} {:?}", M::COLLECTION, model.id());
        Ok(())
    }

    /// Inserts every model in order, stopping at the first failure.
    ///
    /// # Errors
    /// `Persistence` on the first failed insert; earlier models stay inserted.
    pub fn insert_many<M: Model>(
        &self,
        ctx: &QueryContext,
        models: &mut [M],
    ) -> Result<Vec<ObjectId>, RepositoryError> {
        let mut docs = Vec::with_capacity(models.len());
        for m in models.iter_mut() {
            Self::stamp_new(m);
            docs.push(to_document(m)?);
        }
        let res = self.store.insert_many(ctx, M::COLLECTION, docs)?;
        Ok(res.inserted_ids.into_iter().filter_map(|b| b.as_object_id()).collect())
    }

    /// Every match, honouring sort, projection, skip and limit. No match is an empty vector.
    ///
    /// # Errors
    /// `Persistence` on query or decode failure.
    pub fn find<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
        opts: &FindOptions,
    ) -> Result<Vec<M>, RepositoryError> {
        let cursor = self.store.find(ctx, M::COLLECTION, &filter, opts)?;
        decode_all(cursor)
    }

    /// First match after sort; only sort and projection of `opts` apply.
    ///
    /// # Errors
    /// `NotFound` on zero matches, `Persistence` on query or decode failure.
    pub fn find_one<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
        opts: Option<&FindOptions>,
    ) -> Result<M, RepositoryError> {
        let mut one = FindOptions::new().limit(1);
        if let Some(o) = opts {
            one.sort.clone_from(&o.sort);
            one.projection.clone_from(&o.projection);
        }
        let mut cursor = self.store.find(ctx, M::COLLECTION, &filter, &one)?;
        match cursor.next() {
            Some(doc) => decode(doc),
            None => Err(RepositoryError::not_found(M::COLLECTION)),
        }
    }

    /// # Errors
    /// `InvalidIdentifier` before touching the store when `id` is malformed,
    /// `NotFound` when no document carries it.
    pub fn find_by_id<M: Model>(&self, ctx: &QueryContext, id: &str) -> Result<M, RepositoryError> {
        let oid = parse_object_id(id)?;
        self.find_one(ctx, doc! { "_id": oid }, None)
    }

    /// Partial update (`$set`, `$unset`, `$inc`) of the first match.
    ///
    /// # Errors
    /// `Persistence` on malformed updates or store failure. Zero matches is not an error.
    pub fn update_one<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, RepositoryError> {
        Ok(self.store.update(ctx, M::COLLECTION, &filter, &update, false, false)?)
    }

    /// # Errors
    /// `Persistence` on malformed updates or store failure.
    pub fn update_many<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, RepositoryError> {
        Ok(self.store.update(ctx, M::COLLECTION, &filter, &update, true, false)?)
    }

    /// Updates the first match and returns it before or after the change.
    ///
    /// # Errors
    /// `NotFound` when nothing matched and no upsert happened.
    pub fn find_one_and_update<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
        update: Document,
        opts: &FindOneAndUpdateOptions,
    ) -> Result<M, RepositoryError> {
        match self.store.find_one_and_update(ctx, M::COLLECTION, &filter, &update, opts)? {
            Some(doc) => decode(doc),
            None => Err(RepositoryError::not_found(M::COLLECTION)),
        }
    }

    /// Refreshes `updated_at` and replaces the stored document with `model`.
    ///
    /// # Errors
    /// `InvalidIdentifier` when the model has no id, `NotFound` when no
    /// document carries it.
    pub fn update_by_id<M: Model>(&self, ctx: &QueryContext, model: &mut M) -> Result<(), RepositoryError> {
        let Some(id) = model.id() else {
            return Err(RepositoryError::InvalidIdentifier("model has no identifier".into()));
        };
        model.set_updated_at(DateTime::now());
        let doc = to_document(model)?;
        let res = self.store.replace_one(ctx, M::COLLECTION, &doc! { "_id": id }, doc, false)?;
        if res.matched_count == 0 {
            return Err(RepositoryError::not_found(M::COLLECTION));
        }
        Ok(())
    }

    /// # Errors
    /// `Persistence` on store failure. Zero matches is not an error.
    pub fn delete_one<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
    ) -> Result<DeleteResult, RepositoryError> {
        Ok(self.store.delete(ctx, M::COLLECTION, &filter, false)?)
    }

    /// # Errors
    /// `Persistence` on store failure.
    pub fn delete_many<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
    ) -> Result<DeleteResult, RepositoryError> {
        Ok(self.store.delete(ctx, M::COLLECTION, &filter, true)?)
    }

    /// Deletes the document carrying `model`'s id.
    ///
    /// # Errors
    /// `InvalidIdentifier` when the model has no id.
    pub fn delete_by_id<M: Model>(&self, ctx: &QueryContext, model: &M) -> Result<DeleteResult, RepositoryError> {
        let Some(id) = model.id() else {
            return Err(RepositoryError::InvalidIdentifier("model has no identifier".into()));
        };
        Ok(self.store.delete(ctx, M::COLLECTION, &doc! { "_id": id }, false)?)
    }

    /// # Errors
    /// `Persistence` on store failure.
    pub fn count_documents<M: Model>(&self, ctx: &QueryContext, filter: Document) -> Result<u64, RepositoryError> {
        Ok(self.store.count(ctx, M::COLLECTION, &filter)?)
    }

    /// Same as [`BaseRepository::count_documents`].
    ///
    /// # Errors
    /// `Persistence` on store failure.
    pub fn count<M: Model>(&self, ctx: &QueryContext, filter: Document) -> Result<u64, RepositoryError> {
        self.count_documents::<M>(ctx, filter)
    }

    /// Distinct values of `field` among matches, in first-seen order.
    ///
    /// # Errors
    /// `Persistence` on store failure.
    pub fn distinct<M: Model>(
        &self,
        ctx: &QueryContext,
        field: &str,
        filter: Document,
    ) -> Result<Vec<Bson>, RepositoryError> {
        Ok(self.store.distinct(ctx, M::COLLECTION, field, &filter)?)
    }

    /// Runs `pipeline` with disk use allowed.
    ///
    /// # Errors
    /// `Persistence` on invalid stages or store failure.
    pub fn aggregate<M: Model>(
        &self,
        ctx: &QueryContext,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, RepositoryError> {
        let opts = AggregateOptions { allow_disk_use: true };
        let cursor = self.store.aggregate(ctx, M::COLLECTION, pipeline, &opts)?;
        Ok(cursor.collect())
    }

    /// Runs `pipeline` and decodes each output document as `T`.
    ///
    /// # Errors
    /// `Persistence` on invalid stages, store failure or decode failure.
    pub fn aggregate_as<M: Model, T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        pipeline: &[Document],
    ) -> Result<Vec<T>, RepositoryError> {
        let opts = AggregateOptions { allow_disk_use: true };
        let cursor = self.store.aggregate(ctx, M::COLLECTION, pipeline, &opts)?;
        decode_all(cursor)
    }

    /// Executes typed writes in order. Inserted and replacing models get
    /// their system fields stamped. Nothing is rolled back.
    ///
    /// # Errors
    /// `Persistence` on the first failed write.
    pub fn bulk_write<M: Model>(
        &self,
        ctx: &QueryContext,
        operations: Vec<BulkOperation<M>>,
        opts: &BulkWriteOptions,
    ) -> Result<BulkWriteResult, RepositoryError> {
        let mut models = Vec::with_capacity(operations.len());
        for op in operations {
            models.push(match op {
                BulkOperation::Insert(mut m) => {
                    Self::stamp_new(&mut m);
                    WriteModel::InsertOne { document: to_document(&m)? }
                }
                BulkOperation::UpdateOne { filter, update, upsert } => {
                    WriteModel::UpdateOne { filter, update, upsert }
                }
                BulkOperation::UpdateMany { filter, update } => WriteModel::UpdateMany { filter, update },
                BulkOperation::Replace { filter, mut replacement, upsert } => {
                    replacement.set_updated_at(DateTime::now());
                    let mut doc = to_document(&replacement)?;
                    if replacement.id().is_none() {
                        doc.remove("_id");
                    }
                    WriteModel::ReplaceOne { filter, replacement: doc, upsert }
                }
                BulkOperation::DeleteOne { filter } => WriteModel::DeleteOne { filter },
                BulkOperation::DeleteMany { filter } => WriteModel::DeleteMany { filter },
            });
        }
        Ok(self.store.bulk_write(ctx, M::COLLECTION, models, opts)?)
    }
}
