//! In-memory collection: insertion-ordered rows, primary key and unique indexes.
mod core;
mod index_admin;
mod ops;

pub use self::core::Collection;
pub(crate) use self::core::value_key;
pub(crate) use self::ops::with_id;
