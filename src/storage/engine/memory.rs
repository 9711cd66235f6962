use parking_lot::RwLock;
use std::collections::HashMap;

use super::logstore::{Error, Result};
use super::Engine;

/// An in-memory storage engine with the same contract as the log store.
///
/// Used as a baseline backend for benchmarks and as a reference model in tests.
#[derive(Debug)]
pub struct MemoryEngine {
    data: RwLock<Option<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine {
            data: RwLock::new(Some(HashMap::new())),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    type Error = Error;

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let data = self.data.read();
        let data = data.as_ref().ok_or(Error::Closed)?;
        data.get(key).cloned().ok_or(Error::NotFound)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        let data = self.data.read();
        let data = data.as_ref().ok_or(Error::Closed)?;
        Ok(data.contains_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        let data = data.as_mut().ok_or(Error::Closed)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, _key: &[u8]) -> Result<()> {
        self.data.read().as_ref().ok_or(Error::Closed)?;
        Err(Error::Unsupported("delete"))
    }

    fn close(&self) -> Result<()> {
        self.data.write().take().ok_or(Error::Closed)?;
        Ok(())
    }
}
