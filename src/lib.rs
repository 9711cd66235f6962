pub mod bench;
pub mod storage;

pub use storage::engine::logstore::{Config, Error, LogStore, RecoveryMode, Result};
pub use storage::engine::memory::MemoryEngine;
pub use storage::engine::Engine;
