#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod blob;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod geohash;
pub mod index;
pub mod query;
pub mod stats;
pub mod storage;

#[cfg(test)]
pub(crate) mod testkit;

pub use blob::{ImageStore, Thumbnail};
pub use config::StoreConfig;
pub use crate::core::{Coordinate, Place};
pub use error::{Result, StoreError};
pub use query::{PlaceStore, QueryServer};
