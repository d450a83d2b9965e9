//! Sorting pipeline configuration.

use std::path::{Path, PathBuf};

use bytesize::{GIB, MIB};

/// Default maximum size of a single output segment.
pub const DEFAULT_SPLIT_SIZE: u64 = GIB;
/// Default number of record bytes buffered before a run is flushed.
pub const DEFAULT_CHUNK_SIZE: u64 = 75 * MIB;

/// Frequency ranking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyMode {
    /// Plain sorted output.
    Off,
    /// Records ranked by occurrence count, count not written.
    CountOnly,
    /// Records ranked by occurrence count, each line prefixed with its count.
    CountShown,
}

impl FrequencyMode {
    pub fn is_enabled(&self) -> bool {
        *self != FrequencyMode::Off
    }
}

/// Sorting pipeline configuration. Passed by value to [`crate::Sorter`], every stage reads
/// its settings from here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination base name. Rotated segments are derived from it.
    pub output_path: PathBuf,
    /// Collapse equal adjacent records in the merged output.
    pub duplicate_removal: bool,
    /// Maximum bytes per output segment.
    pub split_size: u64,
    /// Maximum buffered record bytes per sorted run. Also bounds the frequency table.
    pub chunk_size: u64,
    /// Trim leading and trailing whitespace of each input line.
    pub strip_whitespace: bool,
    /// Frequency ranking mode.
    pub frequency: FrequencyMode,
    /// Minimum group size retained in frequency mode.
    pub frequency_minimum: u64,
    /// Remove each input file once it has been read completely.
    pub delete_input_after_read: bool,
    /// Directory the scratch directory is created in. OS default if [`None`].
    pub tmp_dir: Option<PathBuf>,
    /// Run file read/write buffer size.
    pub rw_buf_size: Option<usize>,
}

impl Config {
    /// Creates a configuration with default parameters writing to `output_path`.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Config {
            output_path: output_path.into(),
            ..Config::default()
        }
    }

    pub fn with_duplicate_removal(mut self, enabled: bool) -> Self {
        self.duplicate_removal = enabled;
        return self;
    }

    pub fn with_split_size(mut self, split_size: u64) -> Self {
        self.split_size = split_size;
        return self;
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        return self;
    }

    pub fn with_strip_whitespace(mut self, enabled: bool) -> Self {
        self.strip_whitespace = enabled;
        return self;
    }

    /// Sets frequency mode and the minimum group size an entry needs to be retained.
    pub fn with_frequency(mut self, mode: FrequencyMode, minimum: u64) -> Self {
        self.frequency = mode;
        self.frequency_minimum = minimum;
        return self;
    }

    /// Enables removal of input files after they are consumed. Irreversible.
    pub fn with_delete_input_after_read(mut self, enabled: bool) -> Self {
        self.delete_input_after_read = enabled;
        return self;
    }

    pub fn with_tmp_dir(mut self, path: &Path) -> Self {
        self.tmp_dir = Some(path.into());
        return self;
    }

    pub fn with_rw_buf_size(mut self, buf_size: usize) -> Self {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_path: PathBuf::from("sorted.dat"),
            duplicate_removal: true,
            split_size: DEFAULT_SPLIT_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            strip_whitespace: true,
            frequency: FrequencyMode::Off,
            frequency_minimum: 0,
            delete_input_after_read: false,
            tmp_dir: None,
            rw_buf_size: None,
        }
    }
}
