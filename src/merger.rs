//! Binary heap merger.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs).
///
/// Equal items are yielded in input order: an item of the first input comes before an equal
/// item of the second one.
pub struct BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    items: BinaryHeap<Reverse<(T, usize)>>,
    chunks: Vec<C::IntoIter>,
    initiated: bool,
}

impl<T, E, C> BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            initiated: false,
        };
    }

    /// Number of inputs that still have undelivered items.
    pub fn active(&self) -> usize {
        self.items.len()
    }
}

impl<T, E, C> Iterator for BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            for (idx, chunk) in self.chunks.iter_mut().enumerate() {
                if let Some(item) = chunk.next() {
                    match item {
                        Ok(item) => self.items.push(Reverse((item, idx))),
                        Err(err) => return Some(Err(err)),
                    }
                }
            }
        }

        let Reverse((result, idx)) = self.items.pop()?;
        if let Some(item) = self.chunks[idx].next() {
            match item {
                Ok(item) => self.items.push(Reverse((item, idx))),
                Err(err) => return Some(Err(err)),
            }
        }

        return Some(Ok(result));
    }
}
