//! Bond Queue
//!
//! Ordered FIFO of bond batches, strictly increasing by maturity.
//! The head is the burning end (nearest maturity), the tail the minting end
//! (furthest maturity). Admission is governed by a maturity window relative
//! to the caller-supplied current time; eviction is monotonic - a dequeued
//! batch is never re-admitted.

use crate::errors::{EverbondError, EverbondResult};
use crate::types::{BondBatch, BondId};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Maturity-ordered queue of bond batches with a rolling admission window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BondQueue {
    /// Bonds must have at least this long to maturity to be admitted
    min_maturity_sec: u64,
    /// Bonds maturing at or past this horizon are rejected
    max_maturity_sec: u64,
    /// Queued batches, head first
    items: Vec<BondBatch>,
}

impl BondQueue {
    /// Create an empty queue with the given admission window
    pub fn new(min_maturity_sec: u64, max_maturity_sec: u64) -> Self {
        Self {
            min_maturity_sec,
            max_maturity_sec,
            items: Vec::new(),
        }
    }

    /// Admission check: `now + min <= maturity < now + max`
    pub fn is_admissible(&self, bond: &BondBatch, now_sec: u64) -> bool {
        bond.maturity_sec >= now_sec.saturating_add(self.min_maturity_sec)
            && bond.maturity_sec < now_sec.saturating_add(self.max_maturity_sec)
    }

    /// True if a batch with this id is queued
    pub fn contains(&self, id: &BondId) -> bool {
        self.items.iter().any(|b| &b.id == id)
    }

    /// Append a batch at the tail.
    ///
    /// Idempotent: returns `Ok(false)` when the batch is already queued.
    /// Fails with `QueueOrderViolation` if the batch would not extend the
    /// strictly-increasing maturity order.
    pub fn enqueue(&mut self, bond: BondBatch) -> EverbondResult<bool> {
        if self.contains(&bond.id) {
            return Ok(false);
        }

        if let Some(tail) = self.items.last() {
            if bond.maturity_sec <= tail.maturity_sec {
                return Err(EverbondError::QueueOrderViolation {
                    bond: bond.id,
                    maturity_sec: bond.maturity_sec,
                    tail_maturity_sec: tail.maturity_sec,
                });
            }
        }

        self.items.push(bond);
        Ok(true)
    }

    /// Remove and return the head batch
    pub fn dequeue(&mut self) -> Option<BondBatch> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Dequeue every head that is no longer admissible.
    ///
    /// Returns the evicted batches in eviction order; the caller retires
    /// them (their tranches may still sit in the reserve).
    pub fn evict_inadmissible(&mut self, now_sec: u64) -> Vec<BondBatch> {
        let mut evicted = Vec::new();
        while let Some(head) = self.items.first() {
            if self.is_admissible(head, now_sec) {
                break;
            }
            evicted.push(self.items.remove(0));
        }
        evicted
    }

    /// The burning end (nearest maturity)
    pub fn head(&self) -> Option<&BondBatch> {
        self.items.first()
    }

    /// The minting end (furthest maturity)
    pub fn tail(&self) -> Option<&BondBatch> {
        self.items.last()
    }

    /// Queued batches, head first
    pub fn iter(&self) -> impl Iterator<Item = &BondBatch> {
        self.items.iter()
    }

    /// Number of queued batches
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
