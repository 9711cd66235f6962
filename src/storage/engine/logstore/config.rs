/// Buffered bytes above which a put writes the buffer out to the data file.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 256 * 1024;

/// What to do when the data file ends in the middle of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Refuse to open and report the offset of the partial record.
    #[default]
    Strict,

    /// Cut the file back to the end of the last complete record.
    TruncateTail,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Flush once the write buffer grows strictly larger than this.
    pub flush_threshold: usize,
    pub recovery: RecoveryMode,
    /// fsync the data file after every flush.
    pub sync_on_flush: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            recovery: RecoveryMode::default(),
            sync_on_flush: false,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.config.flush_threshold = bytes;
        self
    }

    pub fn recovery(mut self, mode: RecoveryMode) -> Self {
        self.config.recovery = mode;
        self
    }

    pub fn sync_on_flush(mut self, enabled: bool) -> Self {
        self.config.sync_on_flush = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
