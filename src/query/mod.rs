// Submodules for separation of concerns
mod cursor;
mod eval;
mod parse;
mod pipeline;
mod types;
mod update;

pub use cursor::Cursor;
pub(crate) use cursor::CursorLease;
pub use eval::{compare_bson, compare_docs, eval_filter, get_path, project};
pub(crate) use eval::values_equal;
pub use parse::{
    json_to_document, json_to_pipeline, parse_filter, parse_filter_json, parse_projection,
    parse_sort, parse_update, parse_update_json,
};
pub use pipeline::run_pipeline;
pub use types::{
    AggregateOptions, BulkWriteOptions, BulkWriteResult, CmpOp, DeleteResult, Filter,
    FindOneAndUpdateOptions, FindOptions, InsertManyResult, Order, Projection,
    ReturnDocument, SortSpec, UpdateDoc, UpdateResult, WriteModel,
};
pub use update::{apply_update, set_path, unset_path};
