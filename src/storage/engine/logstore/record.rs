//! +-------------------------------------------------------------+
//! |                          RECORD                             |
//! +--------------+------------+------------------+--------------+
//! | Total Size   | Key Size   | Key              | Value        |
//! | (4 bytes BE) | (4 bytes)  | (variable size)  | (variable)   |
//! +--------------+------------+------------------+--------------+
//!
//! `total size` is the combined length of key and value and does not include
//! the header itself.

use super::error::{Error, Result};

/// Size of the fixed record header.
pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Key length plus value length.
    pub total_size: u32,
    pub key_size: u32,
}

impl Header {
    pub fn new(key_len: usize, value_len: usize) -> Result<Self> {
        let total = key_len
            .checked_add(value_len)
            .ok_or(Error::RecordTooLarge { len: usize::MAX })?;
        let total_size = u32::try_from(total).map_err(|_| Error::RecordTooLarge { len: total })?;

        Ok(Self {
            total_size,
            // key_len <= total, so this can't overflow once total fits
            key_size: key_len as u32,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(&self.total_size.to_be_bytes());
        buf[4..].copy_from_slice(&self.key_size.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let total_size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let key_size = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self {
            total_size,
            key_size,
        }
    }

    /// Returns `None` if the key claims more bytes than the whole payload.
    pub fn value_size(&self) -> Option<u32> {
        self.total_size.checked_sub(self.key_size)
    }

    /// Full on-disk length of the record, header included.
    pub fn record_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.total_size as u64
    }
}

/// Appends the encoded record to `buf` and returns the number of bytes written.
pub fn encode_into(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<usize> {
    let header = Header::new(key.len(), value.len())?;
    let len = header.record_len() as usize;

    buf.reserve(len);
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);

    Ok(len)
}
