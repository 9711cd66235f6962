//! An append-only, single file key/value store with an in-memory keydir.
//!
//! +------------------------------------------------------------------------------+
//! |                                  DATA FILE                                   |
//! +--------------+--------------+-------------------+----------------------------+
//! | Total Size   | Key Size     | Key               | Value                      |
//! | (4 bytes)    | (4 bytes)    | (variable size)   | (variable size)            |
//! +--------------+--------------+-------------------+----------------------------+
//! | ...          | ...          | ...               | ...                        |
//! +--------------+--------------+-------------------+----------------------------+
//!
//! There is no file header. Records are only ever appended; a newer record for
//! the same key shadows the older one. New records are staged in an in-memory
//! write buffer and reach the file in one positional write once the buffer
//! grows past the flush threshold.
//!
//! Offsets in the keydir are logical positions in the log and are valid
//! whether the record has been flushed or is still buffered:
//!
//! ```text
//!  0                        flushed_size                    logical_size
//!  |------- data file -------|--------- write buffer ---------|
//! ```

mod config;
mod error;
mod file;
mod recovery;
mod record;

pub use self::config::{Config, ConfigBuilder, RecoveryMode, DEFAULT_FLUSH_THRESHOLD};
pub use self::error::{Error, Result};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use self::file::LogFile;
use self::record::HEADER_SIZE;
use super::Engine;

type Key = Vec<u8>;

/// Represents the location of a record in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Locator {
    /// Logical offset of the record header
    offset: u64,
    /// Size of the value
    value_size: usize,
}

/// An index of keys to the location of their latest record.
type KeyDir = HashMap<Key, Locator>;

/// Everything guarded by the store lock.
#[derive(Debug)]
struct State {
    /// `None` once the store has been closed.
    file: Option<Arc<LogFile>>,
    keydir: KeyDir,
    /// Records appended since the last flush.
    buffer: Vec<u8>,
    /// Logical size of the log, buffered bytes included.
    size: u64,
}

impl State {
    fn file(&self) -> Result<&Arc<LogFile>> {
        self.file.as_ref().ok_or(Error::Closed)
    }

    /// Everything below this offset is in the data file.
    fn flushed_size(&self) -> u64 {
        self.size - self.buffer.len() as u64
    }

    /// Writes the whole buffer at the end of the flushed region and clears it.
    ///
    /// On failure the buffer is left untouched and the file is cut back to the
    /// flushed size so a partial transfer can't leave a torn record behind.
    fn write_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let offset = self.flushed_size();
        let file = self.file()?;

        if let Err(err) = file.write_at(offset, &self.buffer) {
            if let Err(trunc_err) = file.set_len(offset) {
                tracing::error!(offset, %trunc_err, "failed to discard partial flush");
            }
            return Err(err);
        }

        tracing::debug!(offset, bytes = self.buffer.len(), "flushed write buffer");
        self.buffer.clear();
        Ok(())
    }
}

#[derive(Debug)]
pub struct LogStore {
    state: Mutex<State>,
    config: Config,
    path: PathBuf,
}

impl LogStore {
    /// Opens the store at `path` with the default configuration, creating the
    /// data file if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = LogFile::open(&path)?;

        let recovered = recovery::recover(&file, config.recovery)?;
        tracing::debug!(
            path = %path.display(),
            keys = recovered.keydir.len(),
            records = recovered.records,
            size = recovered.end,
            "opened log store"
        );

        let state = State {
            file: Some(Arc::new(file)),
            keydir: recovered.keydir,
            buffer: Vec::new(),
            size: recovered.end,
        };

        Ok(Self {
            state: Mutex::new(state),
            config,
            path,
        })
    }

    /// Appends a record for `key` and points the keydir at it.
    ///
    /// The whole call, including a flush it triggers, runs under the store
    /// lock, so writers are fully serialized.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.file()?;

        let offset = state.size;
        let mark = state.buffer.len();
        let len = record::encode_into(&mut state.buffer, key, value)?;
        state.size += len as u64;

        let location = Locator {
            offset,
            value_size: value.len(),
        };
        let previous = state.keydir.insert(key.to_vec(), location);

        if state.buffer.len() > self.config.flush_threshold {
            if let Err(err) = state.write_buffer() {
                // undo this put only; earlier records stay buffered for the next flush
                state.buffer.truncate(mark);
                state.size = offset;
                match previous {
                    Some(previous) => state.keydir.insert(key.to_vec(), previous),
                    None => state.keydir.remove(key),
                };
                return Err(err);
            }

            if self.config.sync_on_flush {
                state.file()?.sync()?;
            }
        }

        Ok(())
    }

    /// Returns the latest value written for `key`.
    ///
    /// Buffered values are copied out while the lock is held since a
    /// concurrent flush clears the buffer. Flushed regions never change, so
    /// disk reads happen after the lock is released.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let (file, value_offset, value_size) = {
            let state = self.state.lock();
            let file = state.file()?;
            let location = *state.keydir.get(key).ok_or(Error::NotFound)?;

            let value_offset = location.offset + (HEADER_SIZE + key.len()) as u64;
            let flushed = state.flushed_size();

            if location.offset >= flushed {
                let start = (value_offset - flushed) as usize;
                let end = start + location.value_size;
                return Ok(state.buffer[start..end].to_vec());
            }

            (Arc::clone(file), value_offset, location.value_size)
        };

        file.read_at(value_offset, value_size)
    }

    pub fn has(&self, key: &[u8]) -> Result<bool> {
        let state = self.state.lock();
        state.file()?;
        Ok(state.keydir.contains_key(key))
    }

    /// The record format has no tombstone, so keys can never be removed.
    pub fn delete(&self, _key: &[u8]) -> Result<()> {
        self.state.lock().file()?;
        Err(Error::Unsupported("delete"))
    }

    /// Writes out any buffered records and fsyncs the data file.
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.write_buffer()?;
        state.file()?.sync()
    }

    /// Flushes the remaining buffer and releases the data file.
    ///
    /// If the final flush fails the store stays open and close can be retried.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file()?;
        state.write_buffer()?;

        if self.config.sync_on_flush {
            state.file()?.sync()?;
        }

        // readers still holding the handle finish their reads first
        state.file = None;
        state.keydir = KeyDir::new();
        state.buffer = Vec::new();

        tracing::debug!(path = %self.path.display(), size = state.size, "closed log store");
        Ok(())
    }

    /// Returns a snapshot of the live keys, in no particular order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let state = self.state.lock();
        state.file()?;
        Ok(state.keydir.keys().cloned().collect())
    }

    /// Number of live keys.
    ///
    /// This and the size accessors below are introspection only and never
    /// fail. After close the keydir and buffer are gone, so `len` and
    /// `buffered_len` report 0 while the log sizes keep their final values.
    pub fn len(&self) -> usize {
        self.state.lock().keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().file.is_none()
    }

    /// Logical offset up to which records are in the data file.
    pub fn flushed_size(&self) -> u64 {
        self.state.lock().flushed_size()
    }

    /// Logical size of the log, including buffered records.
    pub fn logical_size(&self) -> u64 {
        self.state.lock().size
    }

    pub fn buffered_len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Engine for LogStore {
    type Error = Error;

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        LogStore::get(self, key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        LogStore::has(self, key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        LogStore::put(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        LogStore::delete(self, key)
    }

    fn close(&self) -> Result<()> {
        LogStore::close(self)
    }
}

/// Flush whatever is still buffered if the store was never closed.
impl Drop for LogStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.file.is_none() {
            return;
        }

        if let Err(e) = state.write_buffer() {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "failed to flush log store on drop"
            );
        }
    }
}
