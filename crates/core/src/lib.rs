//! Latch core types and utilities

pub mod error;
pub mod state_dir;
pub mod storage;
pub mod validation;

#[cfg(feature = "tracing")]
pub mod tracing;

pub use error::{CoreError, CoreResult, StorageError};
pub use state_dir::StateDir;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use validation::{Credentials, ValidationError};
