pub mod logstore;
pub mod memory;

/// A simple trait for allowing pluggable key/value storage engine
///
/// Engines are shared between threads, so every operation takes `&self` and
/// the engine is responsible for its own synchronization.
pub trait Engine {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get(&self, key: &[u8]) -> Result<Vec<u8>, Self::Error>;

    fn has(&self, key: &[u8]) -> Result<bool, Self::Error>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error>;

    fn delete(&self, key: &[u8]) -> Result<(), Self::Error>;

    fn close(&self) -> Result<(), Self::Error>;
}
