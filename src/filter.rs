//! Fluent construction of filter expressions.
//!
//! A [`FilterBuilder`] accumulates predicates into a `bson::Document` in
//! insertion order. Calling a predicate twice on the same key replaces the
//! earlier value in place, so each field carries at most one predicate.
//!
//! ```
//! use doclayer::filter::FilterBuilder;
//!
//! let filter = FilterBuilder::new().eq("status", "active").gte("age", 18).build();
//! assert_eq!(filter.len(), 2);
//! ```

use bson::{Bson, Document, doc};

#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filter: Document,
}

impl FilterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&mut self, key: &str, value: Bson) -> &mut Self {
        self.filter.insert(key, value);
        self
    }

    fn op(&mut self, key: &str, op: &str, value: Bson) -> &mut Self {
        let mut inner = Document::new();
        inner.insert(op, value);
        self.put(key, Bson::Document(inner))
    }

    /// Equality: `{key: value}`.
    pub fn eq(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        self.put(key, value.into())
    }

    pub fn ne(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        self.op(key, "$ne", value.into())
    }

    pub fn gt(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        self.op(key, "$gt", value.into())
    }

    pub fn gte(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        self.op(key, "$gte", value.into())
    }

    pub fn lt(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        self.op(key, "$lt", value.into())
    }

    pub fn lte(&mut self, key: &str, value: impl Into<Bson>) -> &mut Self {
        self.op(key, "$lte", value.into())
    }

    /// Membership: `{key: {"$in": [..]}}`.
    pub fn in_values<I, V>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let arr: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.op(key, "$in", Bson::Array(arr))
    }

    pub fn nin_values<I, V>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let arr: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.op(key, "$nin", Bson::Array(arr))
    }

    /// Case-insensitive pattern match. The `i` option is always set.
    pub fn regex(&mut self, key: &str, pattern: &str) -> &mut Self {
        self.put(key, Bson::Document(doc! { "$regex": pattern, "$options": "i" }))
    }

    pub fn exists(&mut self, key: &str, exists: bool) -> &mut Self {
        self.op(key, "$exists", Bson::Boolean(exists))
    }

    /// Sets `$or` to the given sub-expressions. Field predicates already on
    /// the builder stay as sibling keys and are ANDed with the disjunction.
    pub fn or<I>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = Document>,
    {
        let arr = filters.into_iter().map(Bson::Document).collect();
        self.put("$or", Bson::Array(arr))
    }

    pub fn and<I>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = Document>,
    {
        let arr = filters.into_iter().map(Bson::Document).collect();
        self.put("$and", Bson::Array(arr))
    }

    /// Snapshot of the expression built so far. The builder stays usable.
    #[must_use]
    pub fn build(&self) -> Document {
        self.filter.clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }
}

impl From<FilterBuilder> for Document {
    fn from(b: FilterBuilder) -> Self {
        b.filter
    }
}

impl From<&mut FilterBuilder> for Document {
    fn from(b: &mut FilterBuilder) -> Self {
        b.build()
    }
}
