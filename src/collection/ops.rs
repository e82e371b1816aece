use bson::oid::ObjectId;
use bson::{Bson, Document};

use super::core::{Collection, CollectionData};
use crate::context::QueryContext;
use crate::errors::StoreError;
use crate::query::{
    Filter, FindOptions, SortSpec, UpdateDoc, UpdateResult, apply_update, compare_docs,
    eval_filter, get_path, project, set_path, values_equal,
};

// Context is re-checked every this many scanned rows.
const CTX_CHECK_EVERY: usize = 256;

/// Puts `_id` first, generating an `ObjectId` when absent.
pub(crate) fn with_id(mut doc: Document) -> (Bson, Document) {
    if let Some(id) = doc.remove("_id") {
        let mut out = Document::new();
        out.insert("_id", id.clone());
        out.extend(doc);
        return (id, out);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut out = Document::new();
    out.insert("_id", id.clone());
    out.extend(doc);
    (id, out)
}

/// Seed document for an upsert: top-level equality predicates of the filter.
fn upsert_seed(raw: &Document) -> Result<Document, StoreError> {
    let mut seed = Document::new();
    for (k, v) in raw {
        if k.starts_with('$') {
            continue;
        }
        match v {
            Bson::Document(d) if d.keys().next().is_some_and(|op| op.starts_with('$')) => {
                if let Some(eq) = d.get("$eq") {
                    set_path(&mut seed, k, eq.clone())?;
                }
            }
            other => set_path(&mut seed, k, other.clone())?,
        }
    }
    Ok(seed)
}

fn scan_seqs(
    ctx: &QueryContext,
    data: &CollectionData,
    filter: &Filter,
) -> Result<Vec<u64>, StoreError> {
    let mut out = Vec::new();
    for (i, (seq, doc)) in data.rows.iter().enumerate() {
        if i % CTX_CHECK_EVERY == 0 {
            ctx.check()?;
        }
        if eval_filter(doc, filter) {
            out.push(*seq);
        }
    }
    Ok(out)
}

fn sorted_seqs(data: &CollectionData, mut seqs: Vec<u64>, sort: Option<&[SortSpec]>) -> Vec<u64> {
    if let Some(sort) = sort
        && !sort.is_empty()
    {
        seqs.sort_by(|a, b| match (data.rows.get(a), data.rows.get(b)) {
            (Some(x), Some(y)) => compare_docs(x, y, sort),
            _ => std::cmp::Ordering::Equal,
        });
    }
    seqs
}

impl Collection {
    /// # Errors
    /// Returns `DuplicateKey` on an `_id` or unique-index collision.
    pub fn insert(&self, doc: Document) -> Result<Bson, StoreError> {
        let (id, doc) = with_id(doc);
        self.data.write().put_new(self.name(), doc)?;
        Ok(id)
    }

    /// Matching documents after sort, skip, limit and projection.
    ///
    /// # Errors
    /// Fails when the context expires during the scan.
    pub fn find(
        &self,
        ctx: &QueryContext,
        filter: &Filter,
        opts: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let data = self.data.read();
        let seqs = scan_seqs(ctx, &data, filter)?;
        let seqs = sorted_seqs(&data, seqs, opts.sort.as_deref());
        Ok(seqs
            .into_iter()
            .skip(opts.skip_usize())
            .take(opts.limit_usize())
            .filter_map(|s| data.rows.get(&s))
            .map(|d| opts.projection.as_ref().map_or_else(|| d.clone(), |p| project(d, p)))
            .collect())
    }

    /// Every document, unfiltered, for pipeline input.
    ///
    /// # Errors
    /// Fails when the context has already expired.
    pub fn snapshot_docs(&self, ctx: &QueryContext) -> Result<Vec<Document>, StoreError> {
        ctx.check()?;
        Ok(self.documents())
    }

    /// # Errors
    /// Fails when the context expires during the scan.
    pub fn count(&self, ctx: &QueryContext, filter: &Filter) -> Result<u64, StoreError> {
        let data = self.data.read();
        Ok(scan_seqs(ctx, &data, filter)?.len() as u64)
    }

    /// Distinct values of `field` among matches, in first-seen order. Array
    /// values contribute their elements.
    ///
    /// # Errors
    /// Fails when the context expires during the scan.
    pub fn distinct(
        &self,
        ctx: &QueryContext,
        field: &str,
        filter: &Filter,
    ) -> Result<Vec<Bson>, StoreError> {
        let data = self.data.read();
        let mut out: Vec<Bson> = Vec::new();
        for seq in scan_seqs(ctx, &data, filter)? {
            let Some(v) = data.rows.get(&seq).and_then(|d| get_path(d, field)) else { continue };
            let candidates: Vec<&Bson> = match v {
                Bson::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for c in candidates {
                if !out.iter().any(|seen| values_equal(seen, c)) {
                    out.push(c.clone());
                }
            }
        }
        Ok(out)
    }

    /// Applies `upd` to the first (or every, with `multi`) match. With
    /// `upsert` and no match, inserts the filter's equality fields plus the update.
    ///
    /// # Errors
    /// Constraint violations abort at the offending document; earlier
    /// documents of a multi update stay modified.
    pub fn update(
        &self,
        ctx: &QueryContext,
        raw_filter: &Document,
        filter: &Filter,
        upd: &UpdateDoc,
        multi: bool,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        let mut data = self.data.write();
        let mut seqs = scan_seqs(ctx, &data, filter)?;
        if !multi {
            seqs.truncate(1);
        }
        if seqs.is_empty() {
            if !upsert {
                return Ok(UpdateResult::default());
            }
            let mut seed = upsert_seed(raw_filter)?;
            apply_update(&mut seed, upd)?;
            let (id, doc) = with_id(seed);
            data.put_new(self.name(), doc)?;
            return Ok(UpdateResult { matched_count: 0, modified_count: 0, upserted_id: Some(id) });
        }
        let mut result = UpdateResult::default();
        for seq in seqs {
            let Some(mut doc) = data.rows.get(&seq).cloned() else { continue };
            result.matched_count += 1;
            if apply_update(&mut doc, upd)? {
                data.put_existing(self.name(), seq, doc)?;
                result.modified_count += 1;
            }
        }
        Ok(result)
    }

    /// Replaces the first match, keeping its `_id`.
    ///
    /// # Errors
    /// Returns `UpdateError` if the replacement contains operators or a different `_id`.
    pub fn replace_one(
        &self,
        ctx: &QueryContext,
        raw_filter: &Document,
        filter: &Filter,
        replacement: Document,
        upsert: bool,
    ) -> Result<UpdateResult, StoreError> {
        if replacement.keys().any(|k| k.starts_with('$')) {
            return Err(StoreError::UpdateError("replacement document cannot contain operators".into()));
        }
        let mut data = self.data.write();
        let Some(seq) = scan_seqs(ctx, &data, filter)?.first().copied() else {
            if !upsert {
                return Ok(UpdateResult::default());
            }
            let mut seed = upsert_seed(raw_filter)?;
            seed.extend(replacement);
            let (id, doc) = with_id(seed);
            data.put_new(self.name(), doc)?;
            return Ok(UpdateResult { matched_count: 0, modified_count: 0, upserted_id: Some(id) });
        };
        let Some(old) = data.rows.get(&seq).cloned() else {
            return Ok(UpdateResult::default());
        };
        let old_id = old.get("_id").cloned().unwrap_or(Bson::Null);
        if let Some(new_id) = replacement.get("_id")
            && !values_equal(new_id, &old_id)
        {
            return Err(StoreError::UpdateError("the _id field is immutable".into()));
        }
        let (_, doc) = with_id({
            let mut d = replacement;
            d.insert("_id", old_id);
            d
        });
        let changed = doc != old;
        if changed {
            data.put_existing(self.name(), seq, doc)?;
        }
        Ok(UpdateResult { matched_count: 1, modified_count: u64::from(changed), upserted_id: None })
    }

    /// Atomically updates the first match (after `sort`) and returns the
    /// document before or after the change. `None` when nothing matched and
    /// no upsert happened.
    ///
    /// # Errors
    /// Propagates update and constraint errors.
    #[allow(clippy::too_many_arguments)]
    pub fn find_and_modify(
        &self,
        ctx: &QueryContext,
        raw_filter: &Document,
        filter: &Filter,
        upd: &UpdateDoc,
        sort: Option<&[SortSpec]>,
        upsert: bool,
        return_after: bool,
    ) -> Result<Option<Document>, StoreError> {
        let mut data = self.data.write();
        let seqs = scan_seqs(ctx, &data, filter)?;
        let seqs = sorted_seqs(&data, seqs, sort);
        let Some(seq) = seqs.first().copied() else {
            if !upsert {
                return Ok(None);
            }
            let mut seed = upsert_seed(raw_filter)?;
            apply_update(&mut seed, upd)?;
            let (_, doc) = with_id(seed);
            data.put_new(self.name(), doc.clone())?;
            return Ok(return_after.then_some(doc));
        };
        let Some(before) = data.rows.get(&seq).cloned() else { return Ok(None) };
        let mut after = before.clone();
        if apply_update(&mut after, upd)? {
            data.put_existing(self.name(), seq, after.clone())?;
        }
        Ok(Some(if return_after { after } else { before }))
    }

    /// # Errors
    /// Fails when the context expires during the scan.
    pub fn delete(&self, ctx: &QueryContext, filter: &Filter, multi: bool) -> Result<u64, StoreError> {
        let mut data = self.data.write();
        let mut seqs = scan_seqs(ctx, &data, filter)?;
        if !multi {
            seqs.truncate(1);
        }
        let mut deleted = 0;
        for seq in seqs {
            if data.remove(seq).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_filter, parse_update};
    use bson::doc;

    fn ctx() -> QueryContext {
        QueryContext::background()
    }

    fn seeded() -> Collection {
        let c = Collection::new("t");
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            c.insert(doc! { "_id": i as i32, "name": *name, "n": i as i32 }).unwrap();
        }
        c
    }

    #[test]
    fn insert_assigns_object_id_first() {
        let c = Collection::new("t");
        let id = c.insert(doc! { "x": 1 }).unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));
        let docs = c.documents();
        assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let c = seeded();
        let err = c.insert(doc! { "_id": 1_i64 }).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref field, .. } if field == "_id"));
    }

    #[test]
    fn update_one_versus_many() {
        let c = seeded();
        let f = doc! { "n": { "$gte": 0 } };
        let upd = parse_update(&doc! { "$inc": { "n": 10 } }).unwrap();
        let one = c.update(&ctx(), &f, &parse_filter(&f).unwrap(), &upd, false, false).unwrap();
        assert_eq!((one.matched_count, one.modified_count), (1, 1));
        let many = c.update(&ctx(), &f, &parse_filter(&f).unwrap(), &upd, true, false).unwrap();
        assert_eq!((many.matched_count, many.modified_count), (3, 3));
    }

    #[test]
    fn upsert_seeds_from_equality_filter() {
        let c = seeded();
        let f = doc! { "name": "z" };
        let upd = parse_update(&doc! { "$set": { "n": 9 } }).unwrap();
        let r = c.update(&ctx(), &f, &parse_filter(&f).unwrap(), &upd, false, true).unwrap();
        assert!(r.upserted_id.is_some());
        let found = c.find(&ctx(), &parse_filter(&f).unwrap(), &FindOptions::default()).unwrap();
        assert_eq!(found[0].get_i32("n").unwrap(), 9);
    }

    #[test]
    fn unique_index_blocks_conflicting_update() {
        let c = seeded();
        c.create_unique_index("name").unwrap();
        let f = doc! { "_id": 0 };
        let upd = parse_update(&doc! { "$set": { "name": "b" } }).unwrap();
        let err = c.update(&ctx(), &f, &parse_filter(&f).unwrap(), &upd, false, false);
        assert!(matches!(err, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(c.documents()[0].get_str("name").unwrap(), "a");
    }

    #[test]
    fn distinct_flattens_arrays() {
        let c = Collection::new("t");
        c.insert(doc! { "tags": ["x", "y"] }).unwrap();
        c.insert(doc! { "tags": "y" }).unwrap();
        c.insert(doc! { "tags": "z" }).unwrap();
        let vals = c.distinct(&ctx(), "tags", &Filter::True).unwrap();
        assert_eq!(vals, vec![Bson::from("x"), Bson::from("y"), Bson::from("z")]);
    }

    #[test]
    fn find_and_modify_returns_requested_version() {
        let c = seeded();
        let f = doc! { "_id": 2 };
        let upd = parse_update(&doc! { "$set": { "name": "C" } }).unwrap();
        let before = c
            .find_and_modify(&ctx(), &f, &parse_filter(&f).unwrap(), &upd, None, false, false)
            .unwrap()
            .unwrap();
        assert_eq!(before.get_str("name").unwrap(), "c");
        let upd = parse_update(&doc! { "$set": { "name": "D" } }).unwrap();
        let after = c
            .find_and_modify(&ctx(), &f, &parse_filter(&f).unwrap(), &upd, None, false, true)
            .unwrap()
            .unwrap();
        assert_eq!(after.get_str("name").unwrap(), "D");
    }

    #[test]
    fn replace_keeps_id() {
        let c = seeded();
        let f = doc! { "_id": 1 };
        let r = c.replace_one(&ctx(), &f, &parse_filter(&f).unwrap(), doc! { "only": true }, false).unwrap();
        assert_eq!(r.modified_count, 1);
        assert_eq!(c.documents()[1], doc! { "_id": 1, "only": true });
    }

    #[test]
    fn expired_context_aborts_scan() {
        let c = seeded();
        let ctx = QueryContext::with_deadline(std::time::Instant::now());
        assert!(matches!(c.count(&ctx, &Filter::True), Err(StoreError::Timeout)));
    }
}
