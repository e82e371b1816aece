//! Storage backend boundary and the embedded in-memory implementation.

mod memory;
mod monitor;
mod snapshot;

pub use memory::MemoryStore;
pub use monitor::{CommandMonitor, QUERY_TARGET};

use bson::{Bson, Document};

use crate::context::QueryContext;
use crate::errors::StoreError;
use crate::query::{
    AggregateOptions, BulkWriteOptions, BulkWriteResult, Cursor, FindOneAndUpdateOptions,
    FindOptions, InsertManyResult, UpdateResult, DeleteResult, WriteModel,
};

/// A document store addressed by collection name.
///
/// Every command takes the caller's [`QueryContext`] and must fail with
/// `Timeout` or `Cancelled` once it is no longer live. Returned cursors hold
/// a store slot until dropped.
pub trait DocumentStore: Send + Sync {
    /// Inserts one document, returning its `_id` (generated when absent).
    ///
    /// # Errors
    /// `DuplicateKey` on an `_id` or unique-index collision.
    fn insert_one(&self, ctx: &QueryContext, collection: &str, doc: Document)
    -> Result<Bson, StoreError>;

    /// Inserts in order, stopping at the first failure.
    ///
    /// # Errors
    /// The first insert failure; earlier documents stay inserted.
    fn insert_many(
        &self,
        ctx: &QueryContext,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<InsertManyResult, StoreError> {
        let mut inserted_ids = Vec::with_capacity(docs.len());
        for doc in docs {
            inserted_ids.push(self.insert_one(ctx, collection, doc)?);
        }
        Ok(InsertManyResult { inserted_ids })
    }

    /// # Errors
    /// Malformed filters and context expiry.
    fn find(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        opts: &FindOptions,
    ) -> Result<Cursor, StoreError>;

    /// # Errors
    /// Malformed filters and context expiry.
    fn count(&self, ctx: &QueryContext, collection: &str, filter: &Document)
    -> Result<u64, StoreError>;

    /// # Errors
    /// Malformed filters and context expiry.
    fn distinct(
        &self,
        ctx: &QueryContext,
        collection: &str,
        field: &str,
        filter: &Document,
    ) -> Result<Vec<Bson>, StoreError>;

    /// # Errors
    /// Unknown or malformed stages and context expiry.
    fn aggregate(
        &self,
        ctx: &QueryContext,
        collection: &str,
        pipeline: &[Document],
        opts: &AggregateOptions,
    ) -> Result<Cursor, StoreError>;

    /// Partial update of the first match, or every match when `multi`.
    ///
    /// # Errors
    /// Malformed filters or updates, constraint violations and context expiry.
    fn update(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        update: &Document,
        multi: bool,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError>;

    /// # Errors
    /// Operator keys in the replacement, `_id` changes and constraint violations.
    fn replace_one(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError>;

    /// # Errors
    /// Malformed filters or updates, constraint violations and context expiry.
    fn find_one_and_update(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        update: &Document,
        opts: &FindOneAndUpdateOptions,
    ) -> Result<Option<Document>, StoreError>;

    /// # Errors
    /// Malformed filters and context expiry.
    fn delete(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        multi: bool,
    ) -> Result<DeleteResult, StoreError>;

    /// Executes writes in order. Ordered mode stops at the first failure;
    /// unordered mode attempts every write and reports the first failure.
    /// Nothing is rolled back.
    ///
    /// # Errors
    /// The first write failure.
    fn bulk_write(
        &self,
        ctx: &QueryContext,
        collection: &str,
        ops: Vec<WriteModel>,
        opts: &BulkWriteOptions,
    ) -> Result<BulkWriteResult, StoreError> {
        let mut result = BulkWriteResult::default();
        let mut first_err = None;
        for op in ops {
            let step = match op {
                WriteModel::InsertOne { document } => {
                    self.insert_one(ctx, collection, document).map(|_| result.inserted_count += 1)
                }
                WriteModel::UpdateOne { filter, update, upsert } => self
                    .update(ctx, collection, &filter, &update, false, upsert)
                    .map(|r| merge_update(&mut result, &r)),
                WriteModel::UpdateMany { filter, update } => self
                    .update(ctx, collection, &filter, &update, true, false)
                    .map(|r| merge_update(&mut result, &r)),
                WriteModel::ReplaceOne { filter, replacement, upsert } => self
                    .replace_one(ctx, collection, &filter, replacement, upsert)
                    .map(|r| merge_update(&mut result, &r)),
                WriteModel::DeleteOne { filter } => self
                    .delete(ctx, collection, &filter, false)
                    .map(|r| result.deleted_count += r.deleted_count),
                WriteModel::DeleteMany { filter } => self
                    .delete(ctx, collection, &filter, true)
                    .map(|r| result.deleted_count += r.deleted_count),
            };
            if let Err(e) = step {
                if opts.ordered {
                    return Err(e);
                }
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(result), Err)
    }
}

fn merge_update(into: &mut BulkWriteResult, r: &UpdateResult) {
    into.matched_count += r.matched_count;
    into.modified_count += r.modified_count;
    if r.upserted_id.is_some() {
        into.inserted_count += 1;
    }
}
