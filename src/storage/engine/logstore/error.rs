#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("short write at offset {offset}: wrote {written} of {expected} bytes")]
    ShortWrite {
        offset: u64,
        written: usize,
        expected: usize,
    },

    #[error("short read at offset {offset}: read {read} of {expected} bytes")]
    ShortRead {
        offset: u64,
        read: usize,
        expected: usize,
    },

    #[error("key not found")]
    NotFound,

    #[error("{0} is not supported by the log store")]
    Unsupported(&'static str),

    #[error("store is closed")]
    Closed,

    #[error("corrupt log at offset {offset}: {reason}")]
    CorruptLog { offset: u64, reason: String },

    #[error("record of {len} bytes exceeds the maximum record size")]
    RecordTooLarge { len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
