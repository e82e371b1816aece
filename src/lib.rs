//! Fluent filter builder and generic document repository over an embedded
//! document store.
//!
//! ```
//! use doclayer::{BaseRepository, FilterBuilder, MemoryStore, QueryContext};
//! use doclayer::users::User;
//! use std::sync::Arc;
//!
//! let repo = BaseRepository::new(Arc::new(MemoryStore::new("demo")));
//! let ctx = QueryContext::background();
//! let mut ann = User::new("Ann", "ann@example.com");
//! repo.save(&ctx, &mut ann).unwrap();
//!
//! let filter = FilterBuilder::new().regex("name", "^an").build();
//! assert_eq!(repo.count_documents::<User>(&ctx, filter).unwrap(), 1);
//! ```

pub mod cli;
pub mod collection;
pub mod config;
pub mod context;
pub mod error_tracker;
pub mod errors;
pub mod filter;
pub mod locale;
pub mod model;
pub mod pagination;
pub mod query;
pub mod repository;
pub mod response;
pub mod store;
pub mod users;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use bson;

pub use context::QueryContext;
pub use errors::{RepositoryError, StoreError};
pub use filter::FilterBuilder;
pub use model::Model;
pub use pagination::{PaginateOptions, PaginateResult};
pub use query::{FindOptions, Projection, SortSpec};
pub use repository::{BaseRepository, BulkOperation};
pub use store::{DocumentStore, MemoryStore};
