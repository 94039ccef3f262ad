//! src/dataloader/mod.rs
//!
//! This module implements the `DataLoader`.
//!
//! The `DataLoader` coordinates a `Dataset` and a `Collator` to load and batch
//! samples for training, optionally across worker threads.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────┐
//!                  │ ImageDataset │ ←───── RecordTable + Pipeline
//!                  └──────┬───────┘
//!                         │ get(index) -> Sample
//!                         ↓
//!                  ┌──────────────┐
//!                  │  DataLoader  │ ←───── Config (batch_size, workers, seed, etc.)
//!                  └──────┬───────┘
//!                         │ batch indices (sequential or shuffled)
//!                         ↓
//!                   [Worker Threads] (optional, seeded RNG per worker)
//!                         │
//!                         ↓
//!                    ┌──────────┐
//!                    │ Collator │ (stacks samples)
//!                    └────┬─────┘
//!                         ↓
//!                   ┌───────────┐
//!                   │ MiniBatch │ (ready for model)
//!                   └───────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs      # Public API exports
//! ├── config.rs   # DataLoaderConfig, builder, and validation
//! ├── loader.rs   # DataLoader and DataLoaderIter
//! ├── pool.rs     # WorkerPool<Task, Output> with per-worker channels
//! └── thread.rs   # Thread-local worker ID and RNG
//! ```
//!
//! # Performance Guidelines
//!
//! ## Memory Usage
//! - Single-threaded: O(batch_size)
//! - Multi-threaded: O(num_workers x prefetch_factor x batch_size)
//!
//! ## Notes:
//! - Increase `prefetch_factor` if GPU is starved for data
//! - Reduce `batch_size`, `num_workers` or `prefetch_factor` if out-of-memory.

mod config;
mod loader;
mod pool;
mod thread;

pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use loader::{DataLoader, DataLoaderIter};
pub use thread::{
    clear_worker_rng, current_worker_id, init_worker_rng, with_worker_rng, worker_seed,
    WORKER_ID, WORKER_RNG,
};
