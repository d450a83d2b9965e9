//! External sorter.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytesize::ByteSize;

use crate::accumulator::{Dedup, FrequencyTable, Groups};
use crate::buffer::ChunkBuffer;
use crate::config::{Config, FrequencyMode};
use crate::output::SegmentedWriter;
use crate::run::{MergedRuns, RunRegistry};
use crate::source::LineSource;
use crate::Record;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Run file write or read error.
    IO(io::Error),
    /// Input data stream error.
    InputError(io::Error),
    /// Output file creation or write error.
    OutputError(io::Error),
    /// None of the inputs produced a record.
    NoInput,
    /// Sorting was interrupted.
    Interrupted,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::InputError(err) => Some(err),
            SortError::OutputError(err) => Some(err),
            SortError::NoInput | SortError::Interrupted => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::IO(err) => write!(f, "run I/O operation failed: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::OutputError(err) => write!(f, "output data saving error: {}", err),
            SortError::NoInput => write!(f, "no records found in the input files"),
            SortError::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Sorting statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Input files read.
    pub files_loaded: usize,
    /// Input paths skipped because they were missing or not files.
    pub files_skipped: usize,
    /// Records read from all inputs.
    pub records_read: u64,
    /// Sorted runs written to the scratch directory.
    pub runs: usize,
    /// Records (or frequency entries) written to the output.
    pub records_written: u64,
    /// Duplicate records dropped from the output.
    pub duplicates_removed: u64,
    /// Frequency entries evicted to stay within the memory budget.
    pub frequency_evicted: u64,
    /// Output files in order.
    pub segments: Vec<PathBuf>,
}

/// External sorter. Reads line records from input files, sorts them in byte order using
/// bounded memory and writes them out deduplicated, split into size capped segments or ranked
/// by frequency.
pub struct Sorter {
    config: Config,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Sorter {
    /// Creates a new sorter instance.
    pub fn new(config: Config) -> Self {
        Sorter {
            config,
            interrupt: None,
        }
    }

    /// Sets a flag that aborts sorting with [`SortError::Interrupted`] once it is raised.
    /// Scratch runs are removed before the error is returned.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        return self;
    }

    fn check_interrupt(&self) -> Result<(), SortError> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(SortError::Interrupted),
            _ => Ok(()),
        }
    }

    /// Sorts data from the input files in the given order and writes the result.
    ///
    /// # Arguments
    /// * `inputs` - Input files. Missing paths and directories are skipped.
    pub fn sort<I, P>(&self, inputs: I) -> Result<Summary, SortError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let (registry, summary) = self.chunk(inputs)?;
        return self.merge(registry, summary);
    }

    /// Merges the runs produced by [`Sorter::chunk`] and writes the result.
    /// The registry is consumed, so its scratch directory is gone once this returns.
    pub fn merge(&self, registry: RunRegistry, mut summary: Summary) -> Result<Summary, SortError> {
        let merged = registry.merge();

        if self.config.frequency.is_enabled() {
            self.write_frequencies(merged, &mut summary)?;
        } else if self.config.duplicate_removal {
            let mut dedup = Dedup::new(merged);
            self.write_segments(&mut dedup, &mut summary)?;
            summary.duplicates_removed = dedup.removed();
        } else {
            self.write_segments(merged, &mut summary)?;
        }

        return Ok(summary);
    }

    /// Reads all inputs into sorted runs.
    /// Returns the run registry along with the loading part of the statistics.
    pub fn chunk<I, P>(&self, inputs: I) -> Result<(RunRegistry, Summary), SortError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut registry = RunRegistry::new(self.config.tmp_dir.as_deref(), self.config.rw_buf_size)
            .map_err(SortError::TempDir)?;
        let mut chunk_buf = ChunkBuffer::new(self.config.chunk_size);
        let mut summary = Summary::default();

        for input in inputs.into_iter() {
            let path = input.as_ref();
            let source = match LineSource::open(path, self.config.strip_whitespace, self.config.rw_buf_size) {
                Ok(source) => source,
                Err(err) => {
                    log::warn!("{}", err);
                    summary.files_skipped += 1;
                    continue;
                }
            };
            summary.files_loaded += 1;

            let mut records = 0;
            for item in source {
                self.check_interrupt()?;
                chunk_buf.push(item.map_err(SortError::InputError)?);
                records += 1;

                if chunk_buf.is_full() {
                    Self::flush(&mut registry, &mut chunk_buf)?;
                }
            }
            summary.records_read += records;
            log::info!("loaded {} ({} records)", path.display(), records);

            if self.config.delete_input_after_read {
                match fs::remove_file(path) {
                    Ok(()) => log::info!("deleted {}", path.display()),
                    Err(err) => log::warn!("input file {} not deleted: {}", path.display(), err),
                }
            }
        }

        if summary.records_read == 0 {
            return Err(SortError::NoInput);
        }

        if !chunk_buf.is_empty() {
            Self::flush(&mut registry, &mut chunk_buf)?;
        }
        summary.runs = registry.len();

        log::info!(
            "{} files loaded, {} records total, {} runs",
            summary.files_loaded,
            summary.records_read,
            summary.runs
        );

        return Ok((registry, summary));
    }

    fn flush(registry: &mut RunRegistry, chunk_buf: &mut ChunkBuffer) -> Result<(), SortError> {
        log::debug!(
            "flushing chunk ({} records, {}, sorted: {})",
            chunk_buf.len(),
            ByteSize(chunk_buf.mem_size()),
            chunk_buf.is_sorted()
        );
        registry.push_run(chunk_buf.take_sorted()).map_err(SortError::IO)
    }

    fn write_segments<I>(&self, records: I, summary: &mut Summary) -> Result<(), SortError>
    where
        I: Iterator<Item = io::Result<Record>>,
    {
        let mut writer = SegmentedWriter::create(
            &self.config.output_path,
            self.config.split_size,
            self.config.rw_buf_size,
        )
        .map_err(SortError::OutputError)?;

        for record in records {
            self.check_interrupt()?;
            let record = record.map_err(SortError::IO)?;
            writer.write_record(&record).map_err(SortError::OutputError)?;
        }

        summary.records_written = writer.records();
        summary.segments = writer.finish().map_err(SortError::OutputError)?;

        return Ok(());
    }

    fn write_frequencies(&self, merged: MergedRuns, summary: &mut Summary) -> Result<(), SortError> {
        log::info!("counting records");

        let mut table = FrequencyTable::new(self.config.chunk_size, self.config.frequency_minimum);
        for group in Groups::new(merged) {
            self.check_interrupt()?;
            let (record, count) = group.map_err(SortError::IO)?;
            table.offer(record, count);
        }
        summary.frequency_evicted = table.evicted();

        let path = &self.config.output_path;
        let file = fs::File::create(path).map_err(SortError::OutputError)?;
        let mut output_writer = match self.config.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        let show_count = self.config.frequency == FrequencyMode::CountShown;
        for entry in table.into_ranked() {
            if show_count {
                write!(output_writer, "{} ", entry.count).map_err(SortError::OutputError)?;
            }
            output_writer.write_all(&entry.record).map_err(SortError::OutputError)?;
            output_writer.write_all(b"\n").map_err(SortError::OutputError)?;
            summary.records_written += 1;
        }
        output_writer.flush().map_err(SortError::OutputError)?;

        log::info!("saved {} ({} entries)", path.display(), summary.records_written);
        summary.segments = vec![path.clone()];

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use rand::seq::SliceRandom;
    use rstest::*;

    use super::{SortError, Sorter};
    use crate::config::{Config, FrequencyMode};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_inputs(dir: &Path, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(idx, content)| {
                let path = dir.join(format!("input-{}.txt", idx));
                fs::write(&path, content).unwrap();
                path
            })
            .collect()
    }

    fn read_segments(segments: &[PathBuf]) -> String {
        segments.iter().map(|path| fs::read_to_string(path).unwrap()).collect()
    }

    fn is_empty_dir(path: &Path) -> bool {
        fs::read_dir(path).unwrap().next().is_none()
    }

    #[rstest]
    #[case(true, "a\nb\nc\n", 2)]
    #[case(false, "a\na\nb\nb\nc\n", 0)]
    fn test_sort(#[case] dedup: bool, #[case] expected: &str, #[case] removed: u64) {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path(), &["b\na\na\n", "c\nb\n"]);

        let config = Config::new(dir.path().join("sorted.dat"))
            .with_duplicate_removal(dedup)
            .with_tmp_dir(scratch.path());
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(read_segments(&summary.segments), expected);
        assert_eq!(summary.files_loaded, 2);
        assert_eq!(summary.records_read, 5);
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.duplicates_removed, removed);
        assert_eq!(summary.records_written, 5 - removed);
        assert!(is_empty_dir(scratch.path()));
    }

    #[rstest]
    #[case(1)]
    #[case(16)]
    #[case(100)]
    #[case(1 << 20)]
    fn test_sort_multiple_runs(#[case] chunk_size: u64) {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let mut words: Vec<String> = (0..300).map(|i| format!("w{}", i % 120)).collect();
        words.shuffle(&mut rand::thread_rng());
        let (first, second) = words.split_at(170);
        let inputs = write_inputs(
            dir.path(),
            &[(first.join("\n") + "\n").as_str(), second.join("\n").as_str()],
        );

        let config = Config::new(dir.path().join("sorted.txt"))
            .with_chunk_size(chunk_size)
            .with_tmp_dir(scratch.path());
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        let expected: BTreeSet<&String> = words.iter().collect();
        let expected: String = expected.into_iter().map(|w| format!("{}\n", w)).collect();
        assert_eq!(read_segments(&summary.segments), expected);
        assert_eq!(summary.records_read, 300);
        assert_eq!(summary.duplicates_removed, 180);
        assert!(summary.runs >= 1);
        if chunk_size == 1 {
            assert_eq!(summary.runs, 300);
        }
        assert!(is_empty_dir(scratch.path()));
    }

    #[rstest]
    fn test_sort_idempotent(tmp_dir: tempfile::TempDir) {
        let inputs = write_inputs(tmp_dir.path(), &["pear\napple\n fig \napple\n\nkiwi"]);

        let first = Config::new(tmp_dir.path().join("first.txt")).with_chunk_size(12);
        let first = Sorter::new(first).sort(&inputs).unwrap();

        let second = Config::new(tmp_dir.path().join("second.txt")).with_chunk_size(12);
        let second = Sorter::new(second).sort(&first.segments).unwrap();

        let output = read_segments(&first.segments);
        assert_eq!(output, "\napple\nfig\nkiwi\npear\n");
        assert_eq!(read_segments(&second.segments), output);
        assert_eq!(first.duplicates_removed, 1);
        assert_eq!(second.duplicates_removed, 0);
    }

    #[rstest]
    fn test_sort_split(tmp_dir: tempfile::TempDir) {
        let inputs = write_inputs(tmp_dir.path(), &["d\nc\n", "b\na\n"]);
        let base = tmp_dir.path().join("base.ext");

        let config = Config::new(&base).with_split_size(5);
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(summary.segments, vec![base.clone(), tmp_dir.path().join("base-1.ext")]);
        assert_eq!(fs::read_to_string(&summary.segments[0]).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(&summary.segments[1]).unwrap(), "c\nd\n");
    }

    #[rstest]
    fn test_sort_no_strip(tmp_dir: tempfile::TempDir) {
        let inputs = write_inputs(tmp_dir.path(), &[" b\nb\n a\n"]);

        let config = Config::new(tmp_dir.path().join("out")).with_strip_whitespace(false);
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(read_segments(&summary.segments), " a\n b\nb\n");
    }

    #[rstest]
    fn test_sort_skips_invalid_inputs(tmp_dir: tempfile::TempDir) {
        let mut inputs = write_inputs(tmp_dir.path(), &["b\na\n"]);
        inputs.insert(0, tmp_dir.path().join("missing.txt"));
        let subdir = tmp_dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();
        inputs.push(subdir);

        let config = Config::new(tmp_dir.path().join("out.txt"));
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(read_segments(&summary.segments), "a\nb\n");
        assert_eq!(summary.files_loaded, 1);
        assert_eq!(summary.files_skipped, 2);
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![""])]
    #[case(vec!["", ""])]
    fn test_sort_no_input(#[case] contents: Vec<&str>) {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let mut inputs = write_inputs(dir.path(), &contents);
        inputs.push(dir.path().join("missing.txt"));
        let output = dir.path().join("out.txt");

        let config = Config::new(&output).with_tmp_dir(scratch.path());
        let result = Sorter::new(config).sort(&inputs);

        assert!(matches!(result, Err(SortError::NoInput)));
        assert!(!output.exists());
        assert!(is_empty_dir(scratch.path()));
    }

    #[test]
    fn test_sort_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path(), &["b\na\n"]);

        let config = Config::new(dir.path().join("out.txt")).with_tmp_dir(scratch.path());
        let result = Sorter::new(config)
            .with_interrupt(Arc::new(AtomicBool::new(true)))
            .sort(&inputs);

        assert!(matches!(result, Err(SortError::Interrupted)));
        assert!(is_empty_dir(scratch.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_sort_unreadable_run() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path(), &["d\nc\nb\na\n"]);

        let config = Config::new(dir.path().join("out.txt"))
            .with_chunk_size(1)
            .with_tmp_dir(scratch.path());
        let sorter = Sorter::new(config);

        let (mut registry, summary) = sorter.chunk(&inputs).unwrap();
        assert_eq!(registry.len(), 4);
        assert!(!is_empty_dir(scratch.path()));

        // a directory opens fine but fails to read
        registry.runs_mut()[2].replace_reader(fs::File::open(dir.path()).unwrap());
        let result = sorter.merge(registry, summary);

        assert!(matches!(result, Err(SortError::IO(_))));
        assert!(is_empty_dir(scratch.path()));
    }

    #[rstest]
    fn test_sort_delete_input(tmp_dir: tempfile::TempDir) {
        let inputs = write_inputs(tmp_dir.path(), &["b\n", "a\n"]);

        let config = Config::new(tmp_dir.path().join("out.txt")).with_delete_input_after_read(true);
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(read_segments(&summary.segments), "a\nb\n");
        assert!(inputs.iter().all(|path| !path.exists()));
    }

    #[rstest]
    #[case(FrequencyMode::CountShown, 0, "3 b\n2 a\n2 d\n1 c\n")]
    #[case(FrequencyMode::CountOnly, 0, "b\na\nd\nc\n")]
    #[case(FrequencyMode::CountOnly, 2, "b\na\nd\n")]
    #[case(FrequencyMode::CountShown, 3, "3 b\n")]
    fn test_sort_frequency(#[case] mode: FrequencyMode, #[case] minimum: u64, #[case] expected: &str) {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path(), &["b\na\nd\nb\n", "c\nb\na\nd\n"]);

        let config = Config::new(dir.path().join("freq.txt")).with_frequency(mode, minimum);
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(summary.segments.len(), 1);
        assert_eq!(read_segments(&summary.segments), expected);
        assert_eq!(summary.frequency_evicted, 0);
    }

    #[rstest]
    fn test_sort_frequency_over_budget(tmp_dir: tempfile::TempDir) {
        let inputs = write_inputs(tmp_dir.path(), &["b
a
b
c
"]);

        // no entry fits into a single byte, each one is evicted right after it is added
        let config = Config::new(tmp_dir.path().join("freq.txt"))
            .with_chunk_size(1)
            .with_frequency(FrequencyMode::CountShown, 0);
        let summary = Sorter::new(config).sort(&inputs).unwrap();

        assert_eq!(summary.runs, 4);
        assert_eq!(summary.frequency_evicted, 3);
        assert_eq!(summary.records_written, 0);
        assert_eq!(read_segments(&summary.segments), "");
    }
}
