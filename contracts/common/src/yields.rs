//! Yield Table
//!
//! Per-class vectors of seniority yield factors, set administratively and
//! read by the conversion paths. A class key covers every bond with the
//! same collateral and seniority split, so one vector prices all maturities
//! of that class.
//!
//! A class freezes the first time claims are minted against it: rewriting
//! the factors afterwards would silently reprice outstanding claims.

use crate::constants::tranche::MAX_TRANCHES;
use crate::errors::{EverbondError, EverbondResult};
use crate::types::ClassKey;
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Yield factors for one bond class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
struct YieldEntry {
    /// Bond class key
    class: ClassKey,
    /// Per-seniority factors at YIELD_SCALE, most senior first
    factors: Vec<u64>,
    /// Set once claims have been minted against this class
    used: bool,
}

/// Administratively populated map from bond class to yield factors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct YieldTable {
    entries: Vec<YieldEntry>,
}

impl YieldTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the factor vector for a class.
    ///
    /// Fails with `YieldFrozen` once the class has minted claims, and with
    /// `InvalidYieldVector` for an empty or oversized vector.
    pub fn set_class_yields(&mut self, class: ClassKey, factors: Vec<u64>) -> EverbondResult<()> {
        if factors.is_empty() || factors.len() > MAX_TRANCHES {
            return Err(EverbondError::InvalidYieldVector {
                expected: MAX_TRANCHES,
                actual: factors.len(),
            });
        }

        match self.entries.iter_mut().find(|e| e.class == class) {
            Some(entry) => {
                if entry.used {
                    return Err(EverbondError::YieldFrozen { class });
                }
                entry.factors = factors;
            }
            None => self.entries.push(YieldEntry {
                class,
                factors,
                used: false,
            }),
        }
        Ok(())
    }

    /// Factor for a class and seniority index; zero when unset.
    ///
    /// A zero factor marks the tranche non-convertible - callers skip it
    /// rather than invoking the conversion engine.
    pub fn factor(&self, class: &ClassKey, seniority: usize) -> u64 {
        self.entries
            .iter()
            .find(|e| &e.class == class)
            .and_then(|e| e.factors.get(seniority))
            .copied()
            .unwrap_or(0)
    }

    /// The full factor vector for a class, if set
    pub fn factors(&self, class: &ClassKey) -> Option<&[u64]> {
        self.entries
            .iter()
            .find(|e| &e.class == class)
            .map(|e| e.factors.as_slice())
    }

    /// Freeze a class; called on the first mint against it
    pub fn mark_used(&mut self, class: &ClassKey) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.class == class) {
            entry.used = true;
        }
    }

    /// True once the class's factors are frozen
    pub fn is_frozen(&self, class: &ClassKey) -> bool {
        self.entries
            .iter()
            .find(|e| &e.class == class)
            .map(|e| e.used)
            .unwrap_or(false)
    }
}
