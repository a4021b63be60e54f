#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Shared types for the batch feature-extraction engine: job records, result
//! records, the feature-map value type, and the extractor contract that the
//! engine treats as opaque.

mod features;
mod job;

pub use features::{FeatureMap, FeatureValue};
pub use job::{Extract, ExtractError, JobKey, JobOutcome, JobStatus};
