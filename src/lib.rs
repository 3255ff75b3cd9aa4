pub mod clustering;
pub mod errors;
pub mod matching;
pub mod merge;
pub mod models;
pub mod store;
pub mod utils;

pub use errors::{DedupeError, DedupeResult, ScaleWarning, StoreError};
pub use store::{MemoryStore, PgStore, RecordStore, StoreTransaction};
