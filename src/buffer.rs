//! Byte limited chunk buffer.

use crate::Record;

/// In-memory buffer of records limited by the number of record bytes it holds.
/// Each record is accounted as its length plus one separator byte.
pub struct ChunkBuffer {
    limit: u64,
    current_size: u64,
    sorted: bool,
    inner: Vec<Record>,
}

impl ChunkBuffer {
    pub fn new(limit: u64) -> Self {
        ChunkBuffer {
            limit,
            current_size: 0,
            sorted: true,
            inner: Vec::new(),
        }
    }

    /// Adds a new record to the buffer keeping track of whether the buffer is still sorted.
    pub fn push(&mut self, item: Record) {
        if self.sorted {
            if let Some(last) = self.inner.last() {
                self.sorted = *last <= item;
            }
        }
        self.current_size += item.len() as u64 + 1;
        self.inner.push(item);
    }

    /// Returns buffer length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.limit
    }

    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Whether records were pushed in non-decreasing order.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Takes the buffered records out in sorted order, leaving the buffer empty.
    pub fn take_sorted(&mut self) -> Vec<Record> {
        let mut items = std::mem::take(&mut self.inner);
        if !self.sorted {
            log::debug!("sorting chunk data ...");
            items.sort_unstable();
        }

        self.current_size = 0;
        self.sorted = true;

        return items;
    }
}
