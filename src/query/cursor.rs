use bson::Document;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Registration of one open cursor against its store. Dropping it releases the slot.
#[derive(Debug)]
pub(crate) struct CursorLease {
    open: Arc<AtomicUsize>,
}

impl CursorLease {
    pub(crate) fn acquire(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { open: Arc::clone(open) }
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Materialized result set. Stays registered with the store until dropped
/// or fully drained.
#[derive(Debug)]
pub struct Cursor {
    docs: std::vec::IntoIter<Document>,
    lease: Option<CursorLease>,
}

impl Cursor {
    pub(crate) fn new(docs: Vec<Document>, lease: CursorLease) -> Self {
        Self { docs: docs.into_iter(), lease: Some(lease) }
    }

    /// Number of documents not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.docs.len()
    }

    /// Drains the cursor and releases it.
    #[must_use]
    pub fn to_vec(mut self) -> Vec<Document> {
        let out: Vec<Document> = self.docs.by_ref().collect();
        self.lease.take();
        out
    }
}

impl Iterator for Cursor {
    type Item = Document;
    fn next(&mut self) -> Option<Self::Item> {
        let next = self.docs.next();
        if next.is_none() {
            self.lease.take();
        }
        next
    }
}
