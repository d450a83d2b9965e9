//! `wordlist-sort` sorts and deduplicates arbitrarily large line-oriented text files (word lists, for example)
//! using bounded memory.
//!
//! Sorting is done in two passes, as an external sort. During the first pass the input lines are collected into
//! chunks that each fit into a configured byte budget, every chunk is sorted and saved to a temporary file as a
//! sorted run. During the second pass all runs are merged lazily using a binary heap, so memory use is proportional
//! to the number of runs rather than to the amount of data. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Byte order:**
//!   lines are compared as raw bytes, no locale or encoding is assumed.
//! * **Duplicate removal:**
//!   equal lines are collapsed into one while merging (can be disabled).
//! * **Output splitting:**
//!   the result is written to one or more files, none of them larger than a configured size.
//! * **Frequency ranking:**
//!   lines can be ranked by how often they occur instead, keeping the most frequent ones within the memory
//!   budget.
//! * **Scratch cleanup:**
//!   every run is deleted as soon as it is merged, the scratch directory is removed on all exit paths.
//!
//! # Example
//!
//! ```no_run
//! use bytesize::MIB;
//!
//! use wordlist_sort::{Config, Sorter};
//!
//! fn main() {
//!     let config = Config::new("sorted.txt")
//!         .with_chunk_size(50 * MIB)
//!         .with_split_size(512 * MIB);
//!
//!     let summary = Sorter::new(config).sort(["rockyou.txt", "words.txt"]).unwrap();
//!
//!     println!("{} duplicates removed", summary.duplicates_removed);
//! }
//! ```

pub mod accumulator;
pub mod buffer;
pub mod config;
pub mod merger;
pub mod output;
pub mod run;
pub mod sort;
pub mod source;

/// A single line without its terminator. Records are ordered byte-wise.
pub type Record = Vec<u8>;

pub use accumulator::{Dedup, FrequencyEntry, FrequencyTable, Groups};
pub use buffer::ChunkBuffer;
pub use config::{Config, FrequencyMode};
pub use merger::BinaryHeapMerger;
pub use output::SegmentedWriter;
pub use run::{MergedRuns, Run, RunRegistry};
pub use sort::{SortError, Sorter, Summary};
pub use source::{LineSource, SourceError};
