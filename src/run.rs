//! Sorted runs stored in the scratch directory.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use crate::merger::BinaryHeapMerger;
use crate::Record;

/// Sorted run stored in a scratch file, one record per `\n` terminated line.
/// The run is read lazily and its file is deleted as soon as the last record has been read
/// or the run is dropped, whichever comes first.
pub struct Run {
    index: usize,
    records: usize,
    state: Option<RunFile>,
}

struct RunFile {
    reader: io::BufReader<fs::File>,
    path: tempfile::TempPath,
}

impl Run {
    /// Builds a run by dumping already sorted `items` into a new file in `dir`.
    pub fn build(
        dir: &tempfile::TempDir,
        index: usize,
        items: impl IntoIterator<Item = Record>,
        buf_size: Option<usize>,
    ) -> io::Result<Self> {
        let tmp_file = tempfile::Builder::new()
            .prefix(&format!("run-{}-", index))
            .tempfile_in(dir)?;

        let mut run_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file.as_file()),
            None => io::BufWriter::new(tmp_file.as_file()),
        };

        let mut records = 0;
        for item in items.into_iter() {
            run_writer.write_all(&item)?;
            run_writer.write_all(b"\n")?;
            records += 1;
        }
        run_writer.flush()?;
        drop(run_writer);

        let file = tmp_file.reopen()?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(Run {
            index,
            records,
            state: Some(RunFile {
                reader,
                path: tmp_file.into_temp_path(),
            }),
        });
    }

    /// Position of the run in creation order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of records written to the run.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Backing file path, [`None`] once the run has been released.
    pub fn path(&self) -> Option<&Path> {
        self.state.as_ref().map(|state| &*state.path)
    }

    /// Reads the remaining records from `file` instead of the run file.
    #[cfg(test)]
    pub(crate) fn replace_reader(&mut self, file: fs::File) {
        if let Some(state) = self.state.as_mut() {
            state.reader = io::BufReader::new(file);
        }
    }

    fn release(&mut self) {
        if let Some(RunFile { reader, path }) = self.state.take() {
            drop(reader);
            log::trace!("releasing run {} ({})", self.index, path.display());
            if let Err(err) = path.close() {
                log::warn!("run {} file not removed: {}", self.index, err);
            }
        }
    }
}

impl Iterator for Run {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.as_mut()?;

        let mut line = Vec::new();
        match state.reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                self.release();
                None
            }
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => {
                self.release();
                Some(Err(err))
            }
        }
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        self.release();
    }
}

/// Ordered collection of runs together with the scratch directory holding them.
pub struct RunRegistry {
    runs: Vec<Run>,
    dir: tempfile::TempDir,
    rw_buf_size: Option<usize>,
}

impl RunRegistry {
    /// Creates an empty registry and its scratch directory.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory the scratch directory is created in. If the parameter is [`None`]
    ///   default OS temporary directory will be used.
    /// * `rw_buf_size` - Run file read/write buffer size.
    pub fn new(tmp_path: Option<&Path>, rw_buf_size: Option<usize>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("wordlist-sort-");
        let dir = match tmp_path {
            Some(tmp_path) => builder.tempdir_in(tmp_path),
            None => builder.tempdir(),
        }?;

        log::info!("using {} as a temporary directory", dir.path().display());

        return Ok(RunRegistry {
            runs: Vec::new(),
            dir,
            rw_buf_size,
        });
    }

    /// Writes sorted `items` as the next run.
    pub fn push_run(&mut self, items: Vec<Record>) -> io::Result<()> {
        let run = Run::build(&self.dir, self.runs.len(), items, self.rw_buf_size)?;
        log::debug!("saved run {} ({} records)", run.index(), run.records());
        self.runs.push(run);

        return Ok(());
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }

    #[cfg(test)]
    pub(crate) fn runs_mut(&mut self) -> &mut [Run] {
        &mut self.runs
    }

    /// Consumes the registry into a single sorted stream over all runs.
    pub fn merge(self) -> MergedRuns {
        log::info!("merging {} runs", self.runs.len());

        MergedRuns {
            merger: BinaryHeapMerger::new(self.runs),
            _dir: self.dir,
        }
    }
}

/// Globally sorted stream over all runs of a registry. Owns the scratch directory, which is
/// removed when the stream is dropped.
pub struct MergedRuns {
    merger: BinaryHeapMerger<Record, io::Error, Run>,
    _dir: tempfile::TempDir,
}

impl Iterator for MergedRuns {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.merger.next()
    }
}
