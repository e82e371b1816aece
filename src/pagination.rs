use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Page request. Out-of-range values are normalised, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginateOptions {
    pub page: i64,
    pub limit: i64,
}

impl Default for PaginateOptions {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, limit: DEFAULT_LIMIT }
    }
}

impl PaginateOptions {
    #[must_use]
    pub const fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }
    }

    /// `page <= 0` becomes 1; `limit <= 0` becomes 10; `limit > 100` becomes 100.
    #[must_use]
    pub const fn normalized(self) -> Self {
        let page = if self.page <= 0 { DEFAULT_PAGE } else { self.page };
        let limit = if self.limit <= 0 {
            DEFAULT_LIMIT
        } else if self.limit > MAX_LIMIT {
            MAX_LIMIT
        } else {
            self.limit
        };
        Self { page, limit }
    }

    /// Documents to skip: `(page - 1) * limit`, saturating. Call on normalised options.
    #[must_use]
    pub const fn skip(self) -> u64 {
        let skip = (self.page - 1).saturating_mul(self.limit);
        if skip < 0 { 0 } else { skip as u64 }
    }
}

/// One page of results. Serialized field names are part of the public contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaginateResult<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: i64,
    pub limit: i64,
    pub total_page: i64,
    /// `0` when there is no further page.
    pub next_page: i64,
}

impl<T> PaginateResult<T> {
    /// Result whose page bounds derive from `total` alone.
    #[must_use]
    pub fn from_total(data: Vec<T>, total: u64, opts: PaginateOptions) -> Self {
        let total_page = total_pages(total, opts.limit);
        let next_page = if opts.page < total_page { opts.page + 1 } else { 0 };
        Self { data, total, page: opts.page, limit: opts.limit, total_page, next_page }
    }

    /// Result from a probe of up to `limit + 1` items: an extra item means a
    /// next page exists and is trimmed from `data`.
    #[must_use]
    pub fn from_probe(mut data: Vec<T>, total: u64, opts: PaginateOptions) -> Self {
        let limit = usize::try_from(opts.limit).unwrap_or(usize::MAX);
        let has_next = data.len() > limit;
        if has_next {
            data.truncate(limit);
        }
        Self {
            data,
            total,
            page: opts.page,
            limit: opts.limit,
            total_page: total_pages(total, opts.limit),
            next_page: if has_next { opts.page + 1 } else { 0 },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginateResult<U> {
        PaginateResult {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_page: self.total_page,
            next_page: self.next_page,
        }
    }

    /// # Errors
    /// The first error returned by `f`.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<PaginateResult<U>, E> {
        Ok(PaginateResult {
            data: self.data.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_page: self.total_page,
            next_page: self.next_page,
        })
    }
}

/// `ceil(total / limit)`; zero when `limit` is not positive.
#[must_use]
pub fn total_pages(total: u64, limit: i64) -> i64 {
    match u64::try_from(limit) {
        Ok(l) if l > 0 => i64::try_from(total.div_ceil(l)).unwrap_or(i64::MAX),
        _ => 0,
    }
}
