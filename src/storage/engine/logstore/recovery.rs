use memmap2::MmapOptions;

use super::config::RecoveryMode;
use super::error::{Error, Result};
use super::file::LogFile;
use super::record::{Header, HEADER_SIZE};
use super::{KeyDir, Locator};

/// Outcome of scanning the data file.
#[derive(Debug)]
pub(super) struct Recovered {
    pub keydir: KeyDir,
    /// End of the last complete record, which is also the new logical size.
    pub end: u64,
    pub records: u64,
}

/// Rebuilds the keydir with a single forward pass over the data file.
///
/// Later records for a key overwrite earlier ones.
pub(super) fn recover(file: &LogFile, mode: RecoveryMode) -> Result<Recovered> {
    let file_len = file.len()?;
    let mut recovered = Recovered {
        keydir: KeyDir::new(),
        end: 0,
        records: 0,
    };

    if file_len == 0 {
        return Ok(recovered);
    }

    let truncated_at = {
        let mmapped = unsafe { MmapOptions::new().populate().map(file.as_file())? };
        scan(&mmapped, &mut recovered)?
    };

    if let Some(offset) = truncated_at {
        match mode {
            RecoveryMode::Strict => {
                return Err(Error::CorruptLog {
                    offset,
                    reason: format!("truncated record, file ends at {file_len}"),
                });
            }
            RecoveryMode::TruncateTail => {
                tracing::warn!(
                    offset,
                    discarded = file_len - offset,
                    "discarding truncated record at end of log"
                );
                file.set_len(offset)?;
            }
        }
    }

    Ok(recovered)
}

/// Returns the offset of a trailing partial record, if there is one.
fn scan(data: &[u8], recovered: &mut Recovered) -> Result<Option<u64>> {
    let len = data.len();
    let mut position: usize = 0;

    while position < len {
        if len - position < HEADER_SIZE {
            return Ok(Some(position as u64));
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&data[position..position + HEADER_SIZE]);
        let header = Header::decode(&raw);

        let Some(value_size) = header.value_size() else {
            return Err(Error::CorruptLog {
                offset: position as u64,
                reason: format!(
                    "key size {} exceeds record size {}",
                    header.key_size, header.total_size
                ),
            });
        };

        if ((len - position) as u64) < header.record_len() {
            return Ok(Some(position as u64));
        }
        let record_len = header.record_len() as usize;

        let key_start = position + HEADER_SIZE;
        let key = data[key_start..key_start + header.key_size as usize].to_vec();

        recovered.keydir.insert(
            key,
            Locator {
                offset: position as u64,
                value_size: value_size as usize,
            },
        );
        recovered.records += 1;

        position += record_len;
        recovered.end = position as u64;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::record::encode_into;
    use super::*;
    use tempfile::tempdir;

    fn log_with(records: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (key, value) in records {
            encode_into(&mut buf, key.as_bytes(), value.as_bytes()).unwrap();
        }
        buf
    }

    #[test]
    fn empty_file() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();

        let recovered = recover(&file, RecoveryMode::Strict).unwrap();

        assert!(recovered.keydir.is_empty());
        assert_eq!(recovered.end, 0);
        assert_eq!(recovered.records, 0);
    }

    #[test]
    fn later_records_win() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();
        let data = log_with(&[("a", "1"), ("b", "22"), ("a", "333")]);
        file.write_at(0, &data).unwrap();

        let recovered = recover(&file, RecoveryMode::Strict).unwrap();

        assert_eq!(recovered.records, 3);
        assert_eq!(recovered.end, data.len() as u64);
        assert_eq!(recovered.keydir.len(), 2);
        // a(10) + b(11) precede the second write of a
        assert_eq!(
            recovered.keydir[&b"a".to_vec()],
            Locator {
                offset: 21,
                value_size: 3
            }
        );
        assert_eq!(
            recovered.keydir[&b"b".to_vec()],
            Locator {
                offset: 10,
                value_size: 2
            }
        );
    }

    #[test]
    fn truncated_tail_is_rejected_in_strict_mode() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();
        let data = log_with(&[("a", "1"), ("b", "22")]);
        file.write_at(0, &data[..data.len() - 1]).unwrap();

        let err = recover(&file, RecoveryMode::Strict).unwrap_err();
        assert!(matches!(err, Error::CorruptLog { offset: 10, .. }));
    }

    #[test]
    fn truncated_tail_is_discarded() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();
        let data = log_with(&[("a", "1"), ("b", "22")]);
        file.write_at(0, &data[..data.len() - 1]).unwrap();

        let recovered = recover(&file, RecoveryMode::TruncateTail).unwrap();

        assert_eq!(recovered.records, 1);
        assert_eq!(recovered.end, 10);
        assert!(recovered.keydir.contains_key(&b"a".to_vec()));
        assert!(!recovered.keydir.contains_key(&b"b".to_vec()));
        assert_eq!(file.len().unwrap(), 10);
    }

    #[test]
    fn partial_header_is_a_truncation() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();
        let mut data = log_with(&[("a", "1")]);
        data.extend_from_slice(&[0, 0, 0]);
        file.write_at(0, &data).unwrap();

        let recovered = recover(&file, RecoveryMode::TruncateTail).unwrap();

        assert_eq!(recovered.records, 1);
        assert_eq!(file.len().unwrap(), 10);
    }

    #[test]
    fn bad_key_size_is_corruption_in_any_mode() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();
        file.write_at(0, &[0, 0, 0, 1, 0, 0, 0, 2, b'k', b'v']).unwrap();

        let err = recover(&file, RecoveryMode::TruncateTail).unwrap_err();
        assert!(matches!(err, Error::CorruptLog { offset: 0, .. }));
        assert_eq!(file.len().unwrap(), 10);
    }
}
