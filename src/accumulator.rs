//! Duplicate removal and frequency counting over a sorted stream.
//!
//! Both work on adjacency only: the input must be sorted so that equal records are next to
//! each other, which is what [`crate::run::MergedRuns`] yields.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use deepsize::DeepSizeOf;

use crate::Record;

/// Skips records equal to the one emitted before them.
pub struct Dedup<I> {
    inner: I,
    last: Option<Record>,
    removed: u64,
}

impl<I> Dedup<I> {
    pub fn new(inner: I) -> Self {
        Dedup {
            inner,
            last: None,
            removed: 0,
        }
    }

    /// Number of records skipped so far.
    pub fn removed(&self) -> u64 {
        self.removed
    }
}

impl<I, E> Iterator for Dedup<I>
where
    I: Iterator<Item = Result<Record, E>>,
{
    type Item = Result<Record, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = match self.inner.next()? {
                Ok(item) => item,
                Err(err) => return Some(Err(err)),
            };

            if self.last.as_ref() == Some(&item) {
                self.removed += 1;
                continue;
            }

            self.last = Some(item.clone());
            return Some(Ok(item));
        }
    }
}

/// Collapses each maximal run of equal records into a single `(record, count)` pair.
pub struct Groups<I> {
    inner: I,
    current: Option<(Record, u64)>,
}

impl<I> Groups<I> {
    pub fn new(inner: I) -> Self {
        Groups { inner, current: None }
    }
}

impl<I, E> Iterator for Groups<I>
where
    I: Iterator<Item = Result<Record, E>>,
{
    type Item = Result<(Record, u64), E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next() {
                Some(Ok(item)) => {
                    if let Some((record, count)) = self.current.as_mut() {
                        if *record == item {
                            *count += 1;
                            continue;
                        }
                    }
                    if let Some(group) = self.current.replace((item, 1)) {
                        return Some(Ok(group));
                    }
                }
                Some(Err(err)) => return Some(Err(err)),
                None => return self.current.take().map(Ok),
            }
        }
    }
}

/// Record together with the number of times it occurred.
#[derive(Debug, Clone, PartialEq, Eq, DeepSizeOf)]
pub struct FrequencyEntry {
    pub record: Record,
    pub count: u64,
}

impl FrequencyEntry {
    /// Most frequent first, equal counts in record order.
    fn rank(a: &FrequencyEntry, b: &FrequencyEntry) -> Ordering {
        b.count.cmp(&a.count).then_with(|| a.record.cmp(&b.record))
    }
}

// ordered by rank, so the greatest entry is the one evicted first
impl Ord for FrequencyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        FrequencyEntry::rank(self, other)
    }
}

impl PartialOrd for FrequencyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Memory bounded table of frequency entries.
///
/// Once the estimated footprint of the entries exceeds the budget, the least frequent entries are
/// evicted until it fits again. Entries are kept in a heap with the worst ranked one on top, so an
/// eviction costs *log(n)* per evicted entry. Evicted entries are gone for good, so a record that
/// is rare early on but would later rank high is lost. The result is an approximate top-K.
pub struct FrequencyTable {
    budget: u64,
    minimum: u64,
    footprint: u64,
    evicted: u64,
    entries: BinaryHeap<FrequencyEntry>,
}

impl FrequencyTable {
    /// Creates an empty table.
    ///
    /// # Arguments
    /// * `budget` - Maximum estimated footprint of the retained entries in bytes
    /// * `minimum` - Minimum count an entry needs to be retained
    pub fn new(budget: u64, minimum: u64) -> Self {
        FrequencyTable {
            budget,
            minimum,
            footprint: 0,
            evicted: 0,
            entries: BinaryHeap::new(),
        }
    }

    /// Adds a completed group. Returns `false` if the group is below the minimum count.
    pub fn offer(&mut self, mut record: Record, count: u64) -> bool {
        if count < self.minimum {
            return false;
        }

        record.shrink_to_fit();
        let entry = FrequencyEntry { record, count };
        self.footprint += entry.deep_size_of() as u64;
        self.entries.push(entry);

        if self.footprint > self.budget {
            self.evict();
        }

        return true;
    }

    fn evict(&mut self) {
        let before = self.entries.len();
        while self.footprint > self.budget {
            match self.entries.pop() {
                Some(entry) => self.footprint -= entry.deep_size_of() as u64,
                None => break,
            }
        }
        let evicted = before - self.entries.len();
        self.evicted += evicted as u64;

        log::debug!(
            "frequency table over budget, evicted {} entries ({} retained)",
            evicted,
            self.entries.len()
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Estimated memory taken by the retained entries.
    pub fn footprint(&self) -> u64 {
        self.footprint
    }

    /// Number of entries dropped to stay within the budget.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Returns retained entries, most frequent first.
    pub fn into_ranked(self) -> Vec<FrequencyEntry> {
        self.entries.into_sorted_vec()
    }
}
