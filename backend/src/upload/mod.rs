//! Upload module.
//!
//! - Result: aggregation of row outcomes into a [`BulkUploadResult`]
//! - Pipeline: parse → validate → aggregate in one call

pub mod pipeline;
pub mod result;

pub use pipeline::*;
pub use result::BulkUploadResult;
