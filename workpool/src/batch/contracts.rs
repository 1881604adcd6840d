// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Contracts for the two ends a [`Batch`] usually sits between: something that
//! produces groups of records and something that stores them. `Batch` itself
//! does not depend on them.

use std::sync::Arc;

use crate::batch::{Batch, BatchHandler, DEFAULT_BATCH_SIZE};

/// Where a group sits in the whole set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInfo {
    pub batch_index: usize,
    /// Configured group size. The last group may be shorter.
    pub batch_size: usize,
    pub total_item_count: usize,
}

/// Produces records group by group.
pub trait BatchSource<T> {
    /// Calls `on_batch` for every group in order. Stops at the first error.
    fn get_batches(
        &mut self,
        on_batch: &mut dyn FnMut(Vec<T>, BatchInfo) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>;

    /// Releases whatever the source holds open.
    fn finalize(&mut self) -> anyhow::Result<()>;
}

/// Creates a fresh source, e.g. one per worker.
pub type BatchSourceFactory<T> =
    Box<dyn Fn() -> anyhow::Result<Box<dyn BatchSource<T> + Send>> + Send + Sync>;

/// Stores groups of records. May be called from several threads at once.
pub trait BatchDestination<T>: Send + Sync + 'static {
    fn put_batch(&self, batch: Vec<T>) -> anyhow::Result<()>;

    /// Called once after the last group.
    fn finalize(&self) -> anyhow::Result<()>;
}

/// Like [`BatchSource`], for raw bytes.
pub trait BytesSource {
    fn get_batches(
        &mut self,
        on_batch: &mut dyn FnMut(&[u8], BatchInfo) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>;

    fn finalize(&mut self) -> anyhow::Result<()>;
}

/// A batch handler that puts every group into `destination`.
pub fn destination_handler<T, D>(destination: Arc<D>) -> BatchHandler<T>
where
    T: 'static,
    D: BatchDestination<T>,
{
    Arc::new(move |group: Vec<T>| destination.put_batch(group))
}

impl<T: 'static> Batch<T> {
    /// A batch whose full and flushed groups both go to `destination`.
    pub fn with_destination<D: BatchDestination<T>>(capacity: usize, destination: Arc<D>) -> Self {
        let mut batch = Self::default();
        batch.init(capacity, destination_handler(destination), None);
        batch
    }

    /// Pushes every record `source` produces, then flushes.
    /// Returns the number of records pushed.
    pub fn push_from<S>(&self, source: &mut S) -> anyhow::Result<usize>
    where
        S: BatchSource<T> + ?Sized,
    {
        let mut pushed = 0;
        source.get_batches(&mut |group, _info| {
            for record in group {
                self.push(record)?;
                pushed += 1;
            }
            Ok(())
        })?;
        self.flush()?;
        Ok(pushed)
    }
}

/// Serves the items of a vector in groups of `batch_size`.
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
    batch_size: usize,
    finalized: bool,
}

impl<T> VecSource<T> {
    /// A `batch_size` of 0 falls back to [`DEFAULT_BATCH_SIZE`].
    pub fn new(items: Vec<T>, batch_size: usize) -> Self {
        Self {
            items,
            batch_size: if batch_size == 0 {
                DEFAULT_BATCH_SIZE
            } else {
                batch_size
            },
            finalized: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl<T: Clone> BatchSource<T> for VecSource<T> {
    fn get_batches(
        &mut self,
        on_batch: &mut dyn FnMut(Vec<T>, BatchInfo) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        if self.finalized {
            anyhow::bail!("source is already finalized");
        }
        let total_item_count = self.items.len();
        for (batch_index, group) in self.items.chunks(self.batch_size).enumerate() {
            let info = BatchInfo {
                batch_index,
                batch_size: self.batch_size,
                total_item_count,
            };
            on_batch(group.to_vec(), info)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        self.finalized = true;
        Ok(())
    }
}

/// Serves a byte buffer in chunks of `chunk_size`.
#[derive(Debug, Clone)]
pub struct ChunkedBytes {
    bytes: Vec<u8>,
    chunk_size: usize,
    finalized: bool,
}

impl ChunkedBytes {
    pub fn new(bytes: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            bytes: bytes.into(),
            chunk_size: chunk_size.max(1),
            finalized: false,
        }
    }
}

impl BytesSource for ChunkedBytes {
    fn get_batches(
        &mut self,
        on_batch: &mut dyn FnMut(&[u8], BatchInfo) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        if self.finalized {
            anyhow::bail!("source is already finalized");
        }
        let total_item_count = self.bytes.len();
        for (batch_index, chunk) in self.bytes.chunks(self.chunk_size).enumerate() {
            let info = BatchInfo {
                batch_index,
                batch_size: self.chunk_size,
                total_item_count,
            };
            on_batch(chunk, info)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Destination that keeps every group it receives.
    #[derive(Default)]
    struct RecordingDestination {
        groups: Mutex<Vec<Vec<u32>>>,
        finalized: AtomicBool,
    }

    impl BatchDestination<u32> for RecordingDestination {
        fn put_batch(&self, batch: Vec<u32>) -> anyhow::Result<()> {
            if batch.contains(&13) {
                anyhow::bail!("unlucky group");
            }
            self.groups.lock().unwrap().push(batch);
            Ok(())
        }

        fn finalize(&self) -> anyhow::Result<()> {
            self.finalized.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_vec_source_reports_position_in_set() {
        let mut source = VecSource::new((0..7).collect::<Vec<u32>>(), 3);
        let mut seen = Vec::new();
        source
            .get_batches(&mut |group, info| {
                seen.push((group, info));
                Ok(())
            })
            .unwrap();

        let infos: Vec<(usize, usize, usize)> = seen
            .iter()
            .map(|(_, info)| (info.batch_index, info.batch_size, info.total_item_count))
            .collect();
        assert_eq!(infos, vec![(0, 3, 7), (1, 3, 7), (2, 3, 7)]);
        assert_eq!(seen[2].0, vec![6]);
    }

    #[test]
    fn test_source_stops_at_first_error() {
        let mut source = VecSource::new((0..10).collect::<Vec<u32>>(), 2);
        let mut calls = 0;
        let err = source
            .get_batches(&mut |_group, info| {
                calls += 1;
                if info.batch_index == 1 {
                    anyhow::bail!("stop here");
                }
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "stop here");
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_finalized_source_serves_nothing() {
        let mut source = VecSource::new(vec![1u32, 2], 1);
        source.finalize().unwrap();
        assert!(source.is_finalized());
        assert!(source.get_batches(&mut |_group, _info| Ok(())).is_err());
    }

    #[test]
    fn test_source_into_batch_into_destination() {
        let destination = Arc::new(RecordingDestination::default());
        let batch = Batch::with_destination(4, destination.clone());
        let mut source = VecSource::new((0..10).collect::<Vec<u32>>(), 3);

        // regrouped from 3 per source group to 4 per destination group
        assert_eq!(batch.push_from(&mut source).unwrap(), 10);
        source.finalize().unwrap();
        destination.finalize().unwrap();

        assert_eq!(
            *destination.groups.lock().unwrap(),
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]
        );
        assert!(destination.finalized.load(Ordering::SeqCst));
        assert_eq!(batch.position(), 0);
    }

    #[test]
    fn test_destination_error_reaches_the_swapping_push() {
        let destination = Arc::new(RecordingDestination::default());
        let batch = Batch::with_destination(2, destination.clone());

        batch.push(12).unwrap();
        let err = batch.push(13).unwrap_err();
        assert_eq!(err.to_string(), "unlucky group");
        batch.push(14).unwrap();
        batch.flush().unwrap();

        assert_eq!(*destination.groups.lock().unwrap(), vec![vec![14]]);
    }

    #[test]
    fn test_factory_creates_independent_sources() {
        let factory: BatchSourceFactory<u32> = Box::new(|| {
            let source: Box<dyn BatchSource<u32> + Send> = Box::new(VecSource::new(vec![1, 2, 3], 2));
            Ok(source)
        });

        let mut first = factory().unwrap();
        let mut second = factory().unwrap();
        first.finalize().unwrap();

        let mut groups = Vec::new();
        second
            .get_batches(&mut |group, _info| {
                groups.push(group);
                Ok(())
            })
            .unwrap();
        assert_eq!(groups, vec![vec![1, 2], vec![3]]);
        assert!(first.get_batches(&mut |_group, _info| Ok(())).is_err());
    }

    #[test]
    fn test_chunked_bytes() {
        let mut source = ChunkedBytes::new(&b"hello world"[..], 4);
        let mut chunks = Vec::new();
        source
            .get_batches(&mut |chunk, info| {
                chunks.push((String::from_utf8(chunk.to_vec())?, info.batch_index));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                ("hell".to_string(), 0),
                ("o wo".to_string(), 1),
                ("rld".to_string(), 2)
            ]
        );
        source.finalize().unwrap();
        assert!(source.get_batches(&mut |_chunk, _info| Ok(())).is_err());
    }
}
