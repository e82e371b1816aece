use bson::{Bson, Document, doc};

use super::BaseRepository;
use crate::context::QueryContext;
use crate::errors::RepositoryError;
use crate::model::Model;
use crate::pagination::{PaginateOptions, PaginateResult};
use crate::query::FindOptions;

const COUNT_FIELD: &str = "total";

fn count_from(rows: &[Document]) -> u64 {
    match rows.first().and_then(|d| d.get(COUNT_FIELD)) {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        _ => 0,
    }
}

impl BaseRepository {
    /// Pipeline pagination.
    ///
    /// Counts with `pipeline + $count`, then fetches `pipeline + $skip +
    /// $limit(limit + 1)`. The extra item, when present, is trimmed and sets
    /// `next_page = page + 1`; otherwise `next_page` is 0.
    ///
    /// # Errors
    /// `Persistence` on invalid stages or store failure.
    pub fn paginate<M: Model>(
        &self,
        ctx: &QueryContext,
        pipeline: &[Document],
        opts: PaginateOptions,
    ) -> Result<PaginateResult<Document>, RepositoryError> {
        let opts = opts.normalized();

        let mut count_pipeline = pipeline.to_vec();
        count_pipeline.push(doc! { "$count": COUNT_FIELD });
        let total = count_from(&self.aggregate::<M>(ctx, &count_pipeline)?);

        let skip = i64::try_from(opts.skip()).unwrap_or(i64::MAX);
        let mut data_pipeline = pipeline.to_vec();
        data_pipeline.push(doc! { "$skip": skip });
        data_pipeline.push(doc! { "$limit": opts.limit + 1 });
        let data = self.aggregate::<M>(ctx, &data_pipeline)?;

        log::debug!("paginate {} page {} of {} total", M::COLLECTION, opts.page, total);
        Ok(PaginateResult::from_probe(data, total, opts))
    }

    /// Filter pagination.
    ///
    /// Takes the total from `count_documents` and fetches exactly one page;
    /// `total_page` and `next_page` are derived from the total, not probed.
    ///
    /// # Errors
    /// `Persistence` on store or decode failure.
    pub fn find_with_pagination<M: Model>(
        &self,
        ctx: &QueryContext,
        filter: Document,
        opts: PaginateOptions,
    ) -> Result<PaginateResult<M>, RepositoryError> {
        let opts = opts.normalized();
        let total = self.count_documents::<M>(ctx, filter.clone())?;
        let find = FindOptions::new().skip(opts.skip()).limit(opts.limit.unsigned_abs());
        let data = self.find::<M>(ctx, filter, &find)?;
        Ok(PaginateResult::from_total(data, total, opts))
    }
}
