//! In-memory log position stores.
//!
//! The election core reads the local log's epoch and checkpoints through
//! read-only ports; in a full node those are owned by the write path. Here
//! they are small in-memory cells so the election plane can run on its own.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use strand_cluster::Epoch;
use strand_elections::{CheckpointSource, EpochSource};

/// Holds the last epoch recorded in the local log.
pub struct EpochStore {
    last: Mutex<Option<Epoch>>,
}

impl EpochStore {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }
}

impl Default for EpochStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochSource for EpochStore {
    fn last_epoch(&self) -> Option<Epoch> {
        // a poisoned lock still holds a usable value; elections must keep
        // running even if a writer panicked mid-update
        *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the local log positions. All start at -1: nothing written yet.
pub struct CheckpointStore {
    writer: AtomicI64,
    chaser: AtomicI64,
    commit: AtomicI64,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self {
            writer: AtomicI64::new(-1),
            chaser: AtomicI64::new(-1),
            commit: AtomicI64::new(-1),
        }
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointSource for CheckpointStore {
    fn writer_checkpoint(&self) -> i64 {
        self.writer.load(Ordering::Acquire)
    }
    fn chaser_checkpoint(&self) -> i64 {
        self.chaser.load(Ordering::Acquire)
    }
    fn last_commit_position(&self) -> i64 {
        self.commit.load(Ordering::Acquire)
    }
}
