pub mod bucket;

pub use bucket::{BucketAggregator, Sample};
