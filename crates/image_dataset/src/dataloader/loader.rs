//! src/dataloader/loader.rs
//!
//! `DataLoader` and its per-epoch batch iterator.
//!
//! The iterator runs in one of two ways, depending on `num_workers`:
//! - `0`: every batch is loaded on the calling thread
//! - `> 0`: a fresh `WorkerPool` is spawned for the epoch; batch `i` always
//!   goes to worker `i % num_workers` and batches are yielded in order
//!
//! # Seed Coordination
//!
//! One base seed (from `config.seed`, or drawn once per loader) drives both
//! the shuffle order and the augmentation randomness:
//! - shuffle order for epoch `e` comes from `StdRng::seed_from_u64(seed + e)`
//! - worker `w` augments with `base_seed + (e << 32) + w`; the single-threaded
//!   iterator uses worker id 0
//!
//! So a seeded loader yields identical batches across runs, and with
//! `num_workers` 0 and 1 alike.

use crate::collator::{Collator, StackCollator};
use crate::dataset::Dataset;
use crate::minibatch::MiniBatch;
use crate::sample::Sample;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::config::DataLoaderConfig;
use super::pool::WorkerPool;
use super::thread::{current_worker_id, init_worker_rng, worker_seed, WORKER_RNG};

// ================================================================================================
// 1. DataLoader
// ================================================================================================
/// Batches samples of a [`Dataset`] for training.
///
/// # Thread safety:
/// - `DataLoader` itself is Send + Sync and can be shared across threads.
/// - Iterators must be used on a single thread.
///
/// # Type parameters:
/// - `D`: Dataset type
/// - `C`: Collator type (defaults to StackCollator)
///
/// # Example
/// ```ignore
/// let config = DataLoaderConfig::builder()
///     .batch_size(16)
///     .num_workers(4)
///     .shuffle(true)
///     .seed(42)
///     .build();
/// let loader = DataLoader::new(train_dataset, config)?;
/// for epoch in 0..10 {
///     for batch in loader.iter()? {
///         let batch = batch?;
///         let (images, labels) = (batch.images()?, batch.labels());
///     }
/// }
/// ```
pub struct DataLoader<D, C = StackCollator> {
    dataset: Arc<D>,
    collator: Arc<C>,
    config: DataLoaderConfig,
    current_epoch: AtomicUsize,
    runtime_seed: u64,
}

impl<D> DataLoader<D, StackCollator>
where
    D: Dataset + 'static,
{
    pub fn new(dataset: D, config: DataLoaderConfig) -> Result<Self> {
        Self::new_with_collator(dataset, config, StackCollator)
    }
}

impl<D, C> DataLoader<D, C>
where
    D: Dataset + 'static,
    C: Collator + Send + Sync + 'static,
{
    /// # Errors
    /// - Returns error if `batch_size` is 0
    /// - Returns error if `prefetch_factor` is 0 when using workers
    pub fn new_with_collator(dataset: D, config: DataLoaderConfig, collator: C) -> Result<Self> {
        config.validate().context("Invalid DataLoader configuration")?;
        let runtime_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        log::info!(
            "DataLoader: {} samples, batch_size={}, num_workers={}, shuffle={}, seed={}",
            dataset.len(),
            config.batch_size,
            config.num_workers,
            config.shuffle,
            runtime_seed
        );

        Ok(Self {
            dataset: Arc::new(dataset),
            collator: Arc::new(collator),
            config,
            current_epoch: AtomicUsize::new(0),
            runtime_seed,
        })
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// The base seed in effect, whether configured or drawn.
    pub fn seed(&self) -> u64 {
        self.runtime_seed
    }

    /// Epoch the next call to [`iter`](Self::iter) will run.
    pub fn epoch(&self) -> usize {
        self.current_epoch.load(Ordering::SeqCst)
    }

    /// Overrides the epoch counter, e.g. when resuming training.
    pub fn set_epoch(&self, epoch: usize) {
        self.current_epoch.store(epoch, Ordering::SeqCst);
    }

    /// Number of batches one epoch yields.
    pub fn len(&self) -> usize {
        let n = self.dataset.len();
        let batch_size = self.config.batch_size;
        if self.config.drop_last {
            n / batch_size
        } else {
            n.div_ceil(batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an iterator over the batches of the next epoch and advances
    /// the epoch counter.
    pub fn iter(&self) -> Result<DataLoaderIter<'_, D, C>> {
        let epoch = self.current_epoch.fetch_add(1, Ordering::SeqCst);
        let batches = self.batch_indices(epoch);
        log::debug!("epoch {}: {} batches", epoch, batches.len());

        let backend = if self.config.num_workers == 0 {
            Backend::Single {
                rng: Some(StdRng::seed_from_u64(worker_seed(0, epoch, self.runtime_seed))),
            }
        } else {
            Backend::Workers {
                pool: self.spawn_workers(epoch)?,
                pending: BTreeMap::new(),
                next_to_send: 0,
            }
        };

        Ok(DataLoaderIter {
            loader: self,
            batches,
            next_to_yield: 0,
            backend,
        })
    }

    /// Splits `0..len` into batches, shuffled with `seed + epoch` when enabled.
    fn batch_indices(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(self.runtime_seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
            .chunks(self.config.batch_size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == self.config.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Fresh workers per epoch; each seeds its RNG before taking tasks.
    fn spawn_workers(&self, epoch: usize) -> Result<WorkerPool<BatchTask, BatchOutput>> {
        let dataset = Arc::clone(&self.dataset);
        let collator = Arc::clone(&self.collator);
        let base_seed = self.runtime_seed;
        let worker_timeout = self.config.worker_timeout;

        WorkerPool::new(
            self.config.num_workers,
            self.config.prefetch_factor,
            move |task_rx: Receiver<BatchTask>, output_tx: Sender<BatchOutput>, shutdown| {
                let worker_id = current_worker_id();
                init_worker_rng(worker_id, epoch, base_seed);

                while !shutdown.load(Ordering::Relaxed) {
                    match task_rx.recv_timeout(worker_timeout) {
                        Ok(BatchTask { batch, indices }) => {
                            let result = load_batch(dataset.as_ref(), collator.as_ref(), &indices)
                                .with_context(|| {
                                    format!("Worker {} failed to load batch {}", worker_id, batch)
                                });
                            if output_tx.send(BatchOutput { batch, result }).is_err() {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            },
        )
        .context("Failed to create worker pool")
    }
}

/// Fetches every index and collates the samples.
fn load_batch<D, C>(dataset: &D, collator: &C, indices: &[usize]) -> Result<MiniBatch>
where
    D: Dataset + ?Sized,
    C: Collator + ?Sized,
{
    let samples = indices
        .iter()
        .map(|&index| dataset.get(index))
        .collect::<Result<Vec<Sample>>>()?;
    collator.collate(&samples)
}

// ================================================================================================
// 2. DataLoaderIter
// ================================================================================================
struct BatchTask {
    batch: usize,
    indices: Vec<usize>,
}

struct BatchOutput {
    batch: usize,
    result: Result<MiniBatch>,
}

enum Backend {
    /// Loads on the calling thread; the RNG is swapped into `WORKER_RNG`
    /// only while a batch is being built.
    Single { rng: Option<StdRng> },
    Workers {
        pool: WorkerPool<BatchTask, BatchOutput>,
        /// Finished batches that arrived ahead of their turn.
        pending: BTreeMap<usize, Result<MiniBatch>>,
        next_to_send: usize,
    },
}

/// Iterator over one epoch of batches, in batch order.
///
/// A failed batch is yielded as `Err` and iteration continues with the next
/// one. Dropping the iterator stops its workers.
pub struct DataLoaderIter<'a, D, C> {
    loader: &'a DataLoader<D, C>,
    batches: Vec<Vec<usize>>,
    next_to_yield: usize,
    backend: Backend,
}

impl<D, C> DataLoaderIter<'_, D, C>
where
    D: Dataset + 'static,
    C: Collator + Send + Sync + 'static,
{
    fn next_single(&mut self) -> Result<MiniBatch> {
        let Backend::Single { rng } = &mut self.backend else {
            return Err(anyhow!("Single-threaded iteration on a worker backend"));
        };
        let indices = &self.batches[self.next_to_yield];

        // Lend the epoch RNG to this thread, then restore whatever it held
        let previous = WORKER_RNG.with(|slot| slot.replace(rng.take()));
        let result = load_batch(self.loader.dataset.as_ref(), self.loader.collator.as_ref(), indices);
        *rng = WORKER_RNG.with(|slot| slot.replace(previous));

        result.with_context(|| format!("Failed to load batch {}", self.next_to_yield))
    }

    fn next_parallel(&mut self) -> Result<MiniBatch> {
        let Backend::Workers {
            pool,
            pending,
            next_to_send,
        } = &mut self.backend
        else {
            return Err(anyhow!("Parallel iteration on a single-threaded backend"));
        };

        // Keep at most num_workers * prefetch_factor batches in flight
        let max_in_flight = pool.num_workers() * self.loader.config.prefetch_factor;
        while *next_to_send < self.batches.len() && *next_to_send - self.next_to_yield < max_in_flight {
            let batch = *next_to_send;
            let indices = std::mem::take(&mut self.batches[batch]);
            pool.send(batch % pool.num_workers(), BatchTask { batch, indices })?;
            *next_to_send += 1;
        }

        let wanted = self.next_to_yield;
        loop {
            if let Some(result) = pending.remove(&wanted) {
                return result;
            }
            match pool.output_rx.recv_timeout(self.loader.config.timeout) {
                Ok(BatchOutput { batch, result }) => {
                    pending.insert(batch, result);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(anyhow!(
                        "Timed out after {:?} waiting for batch {}",
                        self.loader.config.timeout,
                        wanted
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("Workers exited before delivering batch {}", wanted))
                }
            }
        }
    }
}

impl<D, C> Iterator for DataLoaderIter<'_, D, C>
where
    D: Dataset + 'static,
    C: Collator + Send + Sync + 'static,
{
    type Item = Result<MiniBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_to_yield >= self.batches.len() {
            return None;
        }
        let result = match self.backend {
            Backend::Single { .. } => self.next_single(),
            Backend::Workers { .. } => self.next_parallel(),
        };
        self.next_to_yield += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.batches.len() - self.next_to_yield;
        (remaining, Some(remaining))
    }
}

impl<D, C> ExactSizeIterator for DataLoaderIter<'_, D, C>
where
    D: Dataset + 'static,
    C: Collator + Send + Sync + 'static,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::IMAGE;
    use tch::Tensor;

    /// Sample `i` is a scalar-per-pixel tensor holding `i`.
    struct Counting(usize);

    impl Dataset for Counting {
        fn get(&self, index: usize) -> Result<Sample> {
            if index >= self.0 {
                return Err(crate::error::DatasetError::IndexOutOfRange { index, len: self.0 }.into());
            }
            Ok(Sample::from_single(IMAGE, Tensor::from_slice(&[index as f32])))
        }

        fn len(&self) -> usize {
            self.0
        }
    }

    fn firsts(loader: &DataLoader<Counting>) -> Result<Vec<Vec<f32>>> {
        loader
            .iter()?
            .map(|batch| {
                let batch = batch?;
                let images = batch.images()?;
                Ok((0..images.size()[0])
                    .map(|i| images.double_value(&[i, 0]) as f32)
                    .collect())
            })
            .collect()
    }

    #[test]
    fn test_sequential_batches() -> Result<()> {
        let config = DataLoaderConfig::builder().batch_size(4).build();
        let loader = DataLoader::new(Counting(10), config)?;
        assert_eq!(loader.len(), 3);
        let batches = firsts(&loader)?;
        assert_eq!(batches[0], vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(batches[2], vec![8.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_drop_last() -> Result<()> {
        let config = DataLoaderConfig::builder().batch_size(4).drop_last(true).build();
        let loader = DataLoader::new(Counting(10), config)?;
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.iter()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_shuffle_is_seeded_and_varies_per_epoch() -> Result<()> {
        let make = || {
            DataLoader::new(
                Counting(32),
                DataLoaderConfig::builder().batch_size(8).shuffle(true).seed(7).build(),
            )
        };
        let a = make()?;
        let b = make()?;
        let a0 = firsts(&a)?;
        assert_eq!(a0, firsts(&b)?);
        assert_ne!(a0, firsts(&a)?);
        assert_eq!(a.epoch(), 2);

        let mut all: Vec<f32> = a0.concat();
        all.sort_by(|x, y| x.total_cmp(y));
        assert_eq!(all, (0..32).map(|i| i as f32).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_workers_preserve_batch_order() -> Result<()> {
        let config = DataLoaderConfig::builder()
            .batch_size(3)
            .num_workers(3)
            .prefetch_factor(1)
            .build();
        let loader = DataLoader::new(Counting(20), config)?;
        let batches = firsts(&loader)?;
        assert_eq!(batches.len(), 7);
        let flat: Vec<f32> = batches.concat();
        assert_eq!(flat, (0..20).map(|i| i as f32).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_single_threaded_iteration_keeps_caller_rng() -> Result<()> {
        use crate::dataloader::thread::{clear_worker_rng, with_worker_rng};

        init_worker_rng(0, 0, 99);
        let expected: Vec<u64> = (0..4).map(|_| with_worker_rng(|r| r.random())).collect();

        init_worker_rng(0, 0, 99);
        let config = DataLoaderConfig::builder().batch_size(2).seed(5).build();
        let loader = DataLoader::new(Counting(6), config)?;
        assert_eq!(loader.iter()?.filter(|b| b.is_ok()).count(), 3);
        let after: Vec<u64> = (0..4).map(|_| with_worker_rng(|r| r.random())).collect();
        clear_worker_rng();

        assert_eq!(after, expected);
        Ok(())
    }

    #[test]
    fn test_failed_batch_does_not_stop_iteration() -> Result<()> {
        struct Flaky;
        impl Dataset for Flaky {
            fn get(&self, index: usize) -> Result<Sample> {
                anyhow::ensure!(index != 2, "broken sample {}", index);
                Ok(Sample::from_single(IMAGE, Tensor::from_slice(&[index as f32])))
            }
            fn len(&self) -> usize {
                6
            }
        }

        for workers in [0, 2] {
            let config = DataLoaderConfig::builder().batch_size(2).num_workers(workers).build();
            let loader = DataLoader::new(Flaky, config)?;
            let ok: Vec<bool> = loader.iter()?.map(|b| b.is_ok()).collect();
            assert_eq!(ok, vec![true, false, true]);
        }
        Ok(())
    }
}
