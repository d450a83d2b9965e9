//! Line sources.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::Record;

/// Reason a source could not be opened. None of these abort a sort, the source is skipped.
#[derive(Debug)]
pub enum SourceError {
    /// Path does not exist.
    NotFound(PathBuf),
    /// Path exists but is not a regular file.
    NotAFile(PathBuf),
    /// File could not be opened.
    Io(PathBuf, io::Error),
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SourceError::Io(_, err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SourceError::NotFound(path) => write!(f, "file not found: {}", path.display()),
            SourceError::NotAFile(path) => write!(f, "skipping non-file: {}", path.display()),
            SourceError::Io(path, err) => write!(f, "file {} not opened: {}", path.display(), err),
        }
    }
}

/// Lazy sequence of records read from a single stream, one per `\n` terminated line.
pub struct LineSource<R> {
    reader: R,
    strip_whitespace: bool,
    finished: bool,
}

impl LineSource<io::BufReader<fs::File>> {
    /// Opens a file as a line source.
    ///
    /// # Arguments
    /// * `path` - File to read
    /// * `strip_whitespace` - Trim leading and trailing whitespace of every line
    /// * `buf_size` - Read buffer size, std default if [`None`]
    pub fn open(path: &Path, strip_whitespace: bool, buf_size: Option<usize>) -> Result<Self, SourceError> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(path.into()));
            }
            Err(err) => return Err(SourceError::Io(path.into(), err)),
        };
        if !metadata.is_file() {
            return Err(SourceError::NotAFile(path.into()));
        }

        let file = fs::File::open(path).map_err(|err| SourceError::Io(path.into(), err))?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(LineSource::from_reader(reader, strip_whitespace));
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn from_reader(reader: R, strip_whitespace: bool) -> Self {
        LineSource {
            reader,
            strip_whitespace,
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                self.finished = true;
                None
            }
            Ok(_) => {
                if self.strip_whitespace {
                    let trimmed = trim(&line);
                    if trimmed.len() != line.len() {
                        line = trimmed.to_vec();
                    }
                } else if line.last() == Some(&b'\n') {
                    line.pop();
                }
                Some(Ok(line))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// ASCII whitespace as byte strings treat it, vertical tab included.
fn is_space(b: &u8) -> bool {
    b.is_ascii_whitespace() || *b == b'\x0b'
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !is_space(b)).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !is_space(b)).map_or(start, |i| i + 1);
    return &line[start..end];
}
