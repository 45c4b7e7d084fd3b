pub mod bucket_cache;
pub mod envelope;

pub use bucket_cache::{BucketCache, BucketRecords};
pub use envelope::{BucketMeta, IndexEnvelope};
