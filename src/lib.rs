#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod core;
pub mod index;
pub mod query;
pub mod stats;
pub mod storage;

#[cfg(test)]
mod testutil;

pub use crate::config::{RevisitPolicy, SearchConfig};
pub use crate::core::{CancelToken, SearchError, Tier};
pub use crate::query::{produce, Tiers};
pub use crate::storage::RecordStore;
