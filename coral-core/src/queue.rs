//! Sliding FIFO pool of negative-sample embeddings.

use std::collections::VecDeque;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{CoralError, Result};

/// Eviction policy applied to the queue after every steady-state step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Drop one batch worth of vectors after each step, so the queue always
    /// tracks the most recent window of teacher embeddings.
    PerBatch,
    /// Drop `evict` of the oldest vectors whenever the queue has grown to
    /// `capacity` or beyond.
    Watermark { capacity: usize, evict: usize },
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::PerBatch
    }
}

/// FIFO container of embedding batches supplying contrastive negatives.
///
/// Batches are stored as whole `(rows, dim)` matrices rather than flattened
/// per vector; `dequeue` splits the head batch when the eviction count lands
/// inside it. Entries are expected to be detached from the autograd graph
/// before enqueueing.
#[derive(Debug, Default)]
pub struct BoundedSampleQueue {
    batches: VecDeque<Tensor>,
    size: usize,
}

impl BoundedSampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count of individual vectors (not batches).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Append a `(rows, dim)` batch of embeddings at the tail.
    pub fn enqueue(&mut self, batch: Tensor) -> Result<()> {
        let rows = batch.dim(0)?;
        if rows == 0 {
            return Ok(());
        }
        self.size += rows;
        self.batches.push_back(batch);
        Ok(())
    }

    /// Remove the oldest `k` vectors, preserving the order of the remainder.
    ///
    /// Draining past the available count empties the queue; exhaustion is not
    /// an error.
    pub fn dequeue(&mut self, k: usize) -> Result<()> {
        let mut remaining = k.min(self.size);
        self.size -= remaining;
        while remaining > 0 {
            let Some(head) = self.batches.pop_front() else {
                break;
            };
            let rows = head.dim(0)?;
            if rows <= remaining {
                remaining -= rows;
            } else {
                let tail = head.narrow(0, remaining, rows - remaining)?;
                self.batches.push_front(tail);
                remaining = 0;
            }
        }
        Ok(())
    }

    /// All queued vectors concatenated into a single `(size, dim)` matrix in
    /// FIFO order. Does not mutate the queue.
    ///
    /// Callers are expected to gate on [`is_empty`](Self::is_empty) first;
    /// querying an empty queue is an [`CoralError::EmptyQueue`] error rather
    /// than an empty tensor.
    pub fn get_tensor(&self) -> Result<Tensor> {
        if self.batches.is_empty() {
            return Err(CoralError::EmptyQueue);
        }
        let parts: Vec<&Tensor> = self.batches.iter().collect();
        Ok(Tensor::cat(&parts, 0)?)
    }

    /// Apply the configured eviction policy after a steady-state step.
    pub fn apply_eviction(&mut self, policy: EvictionPolicy, batch_size: usize) -> Result<()> {
        match policy {
            EvictionPolicy::PerBatch => self.dequeue(batch_size),
            EvictionPolicy::Watermark { capacity, evict } => {
                if self.size >= capacity {
                    self.dequeue(evict)
                } else {
                    Ok(())
                }
            }
        }
    }
}
