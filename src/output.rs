//! Size capped output segments.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;

/// Returns the path of output segment `index`. Segment 0 is `base` itself, the others get
/// `-<index>` inserted before the extension, or appended if there is none.
pub fn segment_path(base: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return base.into();
    }

    let mut name = OsString::new();
    if let Some(stem) = base.file_stem() {
        name.push(stem);
    }
    name.push(format!("-{}", index));
    if let Some(extension) = base.extension() {
        name.push(".");
        name.push(extension);
    }

    return base.with_file_name(name);
}

/// Writes records to a sequence of segment files, none of them growing past the split size
/// unless a single record is larger than it.
pub struct SegmentedWriter {
    base: PathBuf,
    split_size: u64,
    buf_size: Option<usize>,
    writer: io::BufWriter<fs::File>,
    index: usize,
    segment_bytes: u64,
    segment_records: u64,
    records: u64,
    segments: Vec<PathBuf>,
}

impl SegmentedWriter {
    /// Creates the first segment at `base`.
    ///
    /// # Arguments
    /// * `base` - Destination base name
    /// * `split_size` - Maximum segment size in bytes
    /// * `buf_size` - Write buffer size, std default if [`None`]
    pub fn create(base: &Path, split_size: u64, buf_size: Option<usize>) -> io::Result<Self> {
        let writer = Self::open_segment(base, buf_size)?;

        return Ok(SegmentedWriter {
            base: base.into(),
            split_size,
            buf_size,
            writer,
            index: 0,
            segment_bytes: 0,
            segment_records: 0,
            records: 0,
            segments: vec![base.into()],
        });
    }

    fn open_segment(path: &Path, buf_size: Option<usize>) -> io::Result<io::BufWriter<fs::File>> {
        let file = fs::File::create(path)?;
        return Ok(match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        });
    }

    /// Appends a record followed by `\n`, rotating to the next segment first if the record
    /// would bring the current one to the split size.
    pub fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let len = record.len() as u64 + 1;
        if self.segment_records > 0 && self.segment_bytes + len >= self.split_size {
            self.rotate()?;
        }

        self.writer.write_all(record)?;
        self.writer.write_all(b"\n")?;
        self.segment_bytes += len;
        self.segment_records += 1;
        self.records += 1;

        return Ok(());
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.log_saved();

        self.index += 1;
        let path = segment_path(&self.base, self.index);
        self.writer = Self::open_segment(&path, self.buf_size)?;
        self.segments.push(path);
        self.segment_bytes = 0;
        self.segment_records = 0;

        return Ok(());
    }

    fn log_saved(&self) {
        if let Some(path) = self.segments.last() {
            log::info!(
                "saved {} ({} records, {})",
                path.display(),
                self.segment_records,
                ByteSize(self.segment_bytes)
            );
        }
    }

    /// Total number of records written across all segments.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flushes the last segment and returns the paths of all segments in order.
    pub fn finish(mut self) -> io::Result<Vec<PathBuf>> {
        self.writer.flush()?;
        self.log_saved();

        return Ok(self.segments);
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::{Path, PathBuf};

    use rstest::*;

    use super::{segment_path, SegmentedWriter};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case("out/sorted.dat", 0, "out/sorted.dat")]
    #[case("out/sorted.dat", 1, "out/sorted-1.dat")]
    #[case("out/sorted.tar.gz", 2, "out/sorted.tar-2.gz")]
    #[case("sorted", 3, "sorted-3")]
    #[case("dir.d/sorted", 1, "dir.d/sorted-1")]
    fn test_segment_path(#[case] base: &str, #[case] index: usize, #[case] expected: &str) {
        assert_eq!(segment_path(Path::new(base), index), PathBuf::from(expected));
    }

    fn write_all(base: &Path, split_size: u64, records: &[&str]) -> Vec<PathBuf> {
        let mut writer = SegmentedWriter::create(base, split_size, None).unwrap();
        for record in records {
            writer.write_record(record.as_bytes()).unwrap();
        }
        assert_eq!(writer.records(), records.len() as u64);
        writer.finish().unwrap()
    }

    #[rstest]
    fn test_rotation(tmp_dir: tempfile::TempDir) {
        let base = tmp_dir.path().join("base.ext");

        let segments = write_all(&base, 5, &["a", "b", "c", "d"]);

        assert_eq!(segments, vec![base.clone(), tmp_dir.path().join("base-1.ext")]);
        assert_eq!(fs::read_to_string(&segments[0]).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(&segments[1]).unwrap(), "c\nd\n");
    }

    #[rstest]
    fn test_rotation_at_cap(tmp_dir: tempfile::TempDir) {
        let base = tmp_dir.path().join("base");

        let segments = write_all(&base, 4, &["a", "b", "c"]);

        let contents: Vec<String> = segments.iter().map(|p| fs::read_to_string(p).unwrap()).collect();
        assert_eq!(contents, vec!["a\n", "b\n", "c\n"]);
        assert_eq!(segments[2], tmp_dir.path().join("base-2"));
    }

    #[rstest]
    fn test_oversized_record(tmp_dir: tempfile::TempDir) {
        let base = tmp_dir.path().join("base.txt");

        let segments = write_all(&base, 3, &["abcdef", "g"]);

        let contents: Vec<String> = segments.iter().map(|p| fs::read_to_string(p).unwrap()).collect();
        assert_eq!(contents, vec!["abcdef\n", "g\n"]);
    }

    #[rstest]
    fn test_no_rotation(tmp_dir: tempfile::TempDir) {
        let base = tmp_dir.path().join("base.txt");

        let segments = write_all(&base, 1024, &["a", "b", "c"]);

        assert_eq!(segments, vec![base.clone()]);
        assert_eq!(fs::read_to_string(&base).unwrap(), "a\nb\nc\n");
    }

    #[rstest]
    fn test_empty_output(tmp_dir: tempfile::TempDir) {
        let base = tmp_dir.path().join("base.txt");

        let segments = write_all(&base, 1024, &[]);

        assert_eq!(segments, vec![base.clone()]);
        assert_eq!(fs::read_to_string(&base).unwrap(), "");
    }
}
