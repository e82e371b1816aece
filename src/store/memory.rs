use bson::{Bson, Document};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::DocumentStore;
use super::monitor::CommandMonitor;
use super::snapshot::{CollectionImage, read_snapshot, write_snapshot};
use crate::collection::Collection;
use crate::context::QueryContext;
use crate::errors::StoreError;
use crate::query::{
    AggregateOptions, Cursor, CursorLease, DeleteResult, FindOneAndUpdateOptions, FindOptions,
    ReturnDocument, UpdateResult, parse_filter, parse_update, run_pipeline,
};

/// Embedded, thread-safe document store.
///
/// Collections are created on first use. Single-document commands run under
/// the collection's write lock and are atomic; multi-document commands are not.
pub struct MemoryStore {
    db_name: String,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    open_cursors: Arc<AtomicUsize>,
    monitor: CommandMonitor,
}

impl MemoryStore {
    #[must_use]
    pub fn new(db_name: &str) -> Self {
        Self {
            db_name: db_name.to_string(),
            collections: RwLock::new(HashMap::new()),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            monitor: CommandMonitor::default(),
        }
    }

    /// Loads a snapshot written by [`MemoryStore::save_snapshot`], or starts
    /// empty under `db_name` when the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn open(path: &Path, db_name: &str) -> Result<Self, StoreError> {
        if !path.exists() {
            log::info!("no snapshot at {}, starting empty", path.display());
            return Ok(Self::new(db_name));
        }
        let (stored_name, images) = read_snapshot(path)?;
        let store = Self::new(if stored_name.is_empty() { db_name } else { &stored_name });
        let mut total = 0usize;
        for image in images {
            let col = store.collection(&image.name);
            total += image.docs.len();
            for doc in image.docs {
                col.insert(doc)?;
            }
            for field in &image.unique_fields {
                col.create_unique_index(field)?;
            }
        }
        log::info!("loaded {} documents from {}", total, path.display());
        Ok(store)
    }

    /// Persists every collection to `path`, replacing the file atomically.
    ///
    /// # Errors
    /// Returns an error if the temporary file cannot be written or renamed.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let mut images: Vec<CollectionImage> = self
            .collections
            .read()
            .values()
            .map(|c| CollectionImage {
                name: c.name().to_string(),
                unique_fields: c.index_fields(),
                docs: c.documents(),
            })
            .collect();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        write_snapshot(path, &self.db_name, &images)?;
        log::debug!("saved snapshot of {} collections to {}", images.len(), path.display());
        Ok(())
    }

    /// Enables or disables the command monitor.
    #[must_use]
    pub fn with_command_logging(self, on: bool) -> Self {
        self.monitor.set_enabled(on);
        self
    }

    #[must_use]
    pub const fn monitor(&self) -> &CommandMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Returns the named collection, creating it if needed.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(c) = self.collections.read().get(name) {
            return Arc::clone(c);
        }
        let mut map = self.collections.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| Arc::new(Collection::new(name))))
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    /// # Errors
    /// Returns `DuplicateKey` if existing documents already collide on `field`.
    pub fn create_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        self.collection(collection).create_unique_index(field)
    }

    /// Cursors handed out and not yet dropped or drained.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    fn cursor(&self, docs: Vec<Document>) -> Cursor {
        Cursor::new(docs, CursorLease::acquire(&self.open_cursors))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("db_name", &self.db_name)
            .field("collections", &self.list_collection_names())
            .field("open_cursors", &self.open_cursors())
            .finish_non_exhaustive()
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(
        &self,
        ctx: &QueryContext,
        collection: &str,
        doc: Document,
    ) -> Result<Bson, StoreError> {
        self.monitor.observe("insert", collection, || doc.to_string(), || {
            ctx.check()?;
            self.collection(collection).insert(doc.clone())
        })
    }

    fn find(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        opts: &FindOptions,
    ) -> Result<Cursor, StoreError> {
        let docs = self.monitor.observe("find", collection, || filter.to_string(), || {
            ctx.check()?;
            let filter = parse_filter(filter)?;
            match self.get_collection(collection) {
                Some(c) => c.find(ctx, &filter, opts),
                None => Ok(Vec::new()),
            }
        })?;
        Ok(self.cursor(docs))
    }

    fn count(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
    ) -> Result<u64, StoreError> {
        self.monitor.observe("count", collection, || filter.to_string(), || {
            ctx.check()?;
            let filter = parse_filter(filter)?;
            self.get_collection(collection).map_or(Ok(0), |c| c.count(ctx, &filter))
        })
    }

    fn distinct(
        &self,
        ctx: &QueryContext,
        collection: &str,
        field: &str,
        filter: &Document,
    ) -> Result<Vec<Bson>, StoreError> {
        self.monitor.observe("distinct", collection, || format!("{field} {filter}"), || {
            ctx.check()?;
            let filter = parse_filter(filter)?;
            self.get_collection(collection)
                .map_or_else(|| Ok(Vec::new()), |c| c.distinct(ctx, field, &filter))
        })
    }

    fn aggregate(
        &self,
        ctx: &QueryContext,
        collection: &str,
        pipeline: &[Document],
        opts: &AggregateOptions,
    ) -> Result<Cursor, StoreError> {
        let detail = || format!("{} stages, allow_disk_use={}", pipeline.len(), opts.allow_disk_use);
        let docs = self.monitor.observe("aggregate", collection, detail, || {
            ctx.check()?;
            let input = match self.get_collection(collection) {
                Some(c) => c.snapshot_docs(ctx)?,
                None => Vec::new(),
            };
            run_pipeline(ctx, input, pipeline)
        })?;
        Ok(self.cursor(docs))
    }

    fn update(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        update: &Document,
        multi: bool,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        let command = if multi { "update_many" } else { "update_one" };
        self.monitor.observe(command, collection, || format!("{filter} {update}"), || {
            ctx.check()?;
            let parsed = parse_filter(filter)?;
            let upd = parse_update(update)?;
            let col = if upsert {
                self.collection(collection)
            } else {
                match self.get_collection(collection) {
                    Some(c) => c,
                    None => return Ok(UpdateResult::default()),
                }
            };
            col.update(ctx, filter, &parsed, &upd, multi, upsert)
        })
    }

    fn replace_one(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        self.monitor.observe("replace_one", collection, || filter.to_string(), || {
            ctx.check()?;
            let parsed = parse_filter(filter)?;
            self.collection(collection).replace_one(ctx, filter, &parsed, replacement, upsert)
        })
    }

    fn find_one_and_update(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        update: &Document,
        opts: &FindOneAndUpdateOptions,
    ) -> Result<Option<Document>, StoreError> {
        self.monitor.observe("find_one_and_update", collection, || format!("{filter} {update}"), || {
            ctx.check()?;
            let parsed = parse_filter(filter)?;
            let upd = parse_update(update)?;
            self.collection(collection).find_and_modify(
                ctx,
                filter,
                &parsed,
                &upd,
                opts.sort.as_deref(),
                opts.upsert,
                opts.return_document == ReturnDocument::After,
            )
        })
    }

    fn delete(
        &self,
        ctx: &QueryContext,
        collection: &str,
        filter: &Document,
        multi: bool,
    ) -> Result<DeleteResult, StoreError> {
        let command = if multi { "delete_many" } else { "delete_one" };
        self.monitor.observe(command, collection, || filter.to_string(), || {
            ctx.check()?;
            let parsed = parse_filter(filter)?;
            let deleted_count = match self.get_collection(collection) {
                Some(c) => c.delete(ctx, &parsed, multi)?,
                None => 0,
            };
            Ok(DeleteResult { deleted_count })
        })
    }
}
