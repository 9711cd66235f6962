use std::fs::{self, File};
use std::path::Path;

use super::error::{Error, Result};

/// The data file, addressed by absolute offset.
///
/// There is no buffering at this level; every call is a single positional
/// syscall. Positional I/O does not move a shared cursor, so concurrent calls
/// against disjoint regions are safe through a shared reference.
#[derive(Debug)]
pub struct LogFile {
    file: File,
}

impl LogFile {
    /// Opens the file for reading and writing, creating it if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Writes all of `buf` at `offset` in one call. A partial transfer is not
    /// retried and is reported as [`Error::ShortWrite`].
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let written = positional::write_at(&self.file, buf, offset)?;
        if written != buf.len() {
            return Err(Error::ShortWrite {
                offset,
                written,
                expected: buf.len(),
            });
        }
        Ok(())
    }

    /// Reads exactly `len` bytes at `offset`, or fails with [`Error::ShortRead`].
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut read = 0;

        // a positional read may legally return fewer bytes than asked for
        // before eof, so keep going until it reports 0
        while read < len {
            let n = positional::read_at(&self.file, &mut buf[read..], offset + read as u64)?;
            if n == 0 {
                return Err(Error::ShortRead {
                    offset,
                    read,
                    expected: len,
                });
            }
            read += n;
        }

        Ok(buf)
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub(super) fn as_file(&self) -> &File {
        &self.file
    }
}

#[cfg(unix)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::FileExt;

    pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
        file.write_at(buf, offset)
    }

    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.read_at(buf, offset)
    }
}

#[cfg(windows)]
mod positional {
    use std::fs::File;
    use std::io;
    use std::os::windows::fs::FileExt;

    pub fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
        file.seek_write(buf, offset)
    }

    pub fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.seek_read(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.log");

        let file = LogFile::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(file.len().unwrap(), 0);
    }

    #[test]
    fn write_then_read_at_offsets() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();

        file.write_at(0, b"hello").unwrap();
        file.write_at(5, b" world").unwrap();

        assert_eq!(file.len().unwrap(), 11);
        assert_eq!(file.read_at(0, 11).unwrap(), b"hello world");
        assert_eq!(file.read_at(6, 5).unwrap(), b"world");
    }

    #[test]
    fn read_past_end() {
        let temp_dir = tempdir().unwrap();
        let file = LogFile::open(temp_dir.path().join("data.log")).unwrap();
        file.write_at(0, b"abc").unwrap();

        let err = file.read_at(1, 10).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                offset: 1,
                read: 2,
                expected: 10
            }
        ));
    }

    #[test]
    fn reopen_keeps_contents() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("data.log");

        LogFile::open(&path).unwrap().write_at(0, b"persist").unwrap();
        let file = LogFile::open(&path).unwrap();

        assert_eq!(file.read_at(0, 7).unwrap(), b"persist");
    }
}
