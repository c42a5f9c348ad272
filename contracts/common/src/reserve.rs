//! Reserve Ledger
//!
//! Tracks the set of asset balances held against outstanding claims or
//! shares. Membership changes only through [`ReserveLedger::sync`]: an
//! asset is tracked iff its balance exceeds the dust floor at the moment of
//! sync. Iteration preserves insertion order so redemption payouts are
//! deterministic.

use crate::errors::{EverbondError, EverbondResult};
use crate::math::safe_add;
use crate::types::TokenId;
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Hard cap on tracked assets per ledger
pub use crate::constants::reserve::MAX_TRACKED_ASSETS;

/// A tracked asset balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReserveEntry {
    /// Asset token
    pub token: TokenId,
    /// Balance recorded at the last sync
    pub balance: u64,
}

/// Membership change reported by a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Asset crossed above the dust floor and is now tracked
    Added,
    /// Asset was tracked and its balance changed
    Updated,
    /// Asset fell to dust and was dropped
    Removed,
    /// Asset is at or below dust and was not tracked to begin with
    Untracked,
}

/// Insertion-ordered set of asset balances with dust suppression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReserveLedger {
    /// Balances at or below this are written off
    dust_floor: u64,
    /// Tracked assets in insertion order
    entries: Vec<ReserveEntry>,
}

impl ReserveLedger {
    /// Create an empty ledger with the given dust floor
    pub fn new(dust_floor: u64) -> Self {
        Self {
            dust_floor,
            entries: Vec::new(),
        }
    }

    /// The configured dust floor
    pub fn dust_floor(&self) -> u64 {
        self.dust_floor
    }

    /// Reconcile an asset's membership against its observed balance.
    ///
    /// The only mutator of set membership; callers invoke it after every
    /// balance-affecting transfer. Idempotent for an unchanged balance.
    pub fn sync(&mut self, token: TokenId, balance: u64) -> EverbondResult<SyncOutcome> {
        let position = self.entries.iter().position(|e| e.token == token);

        if balance <= self.dust_floor {
            return Ok(match position {
                Some(i) => {
                    self.entries.remove(i);
                    SyncOutcome::Removed
                }
                None => SyncOutcome::Untracked,
            });
        }

        match position {
            Some(i) => {
                self.entries[i].balance = balance;
                Ok(SyncOutcome::Updated)
            }
            None => {
                if self.entries.len() >= MAX_TRACKED_ASSETS {
                    return Err(EverbondError::DeployedCountOverLimit {
                        count: self.entries.len() + 1,
                        limit: MAX_TRACKED_ASSETS,
                    });
                }
                self.entries.push(ReserveEntry { token, balance });
                Ok(SyncOutcome::Added)
            }
        }
    }

    /// Recorded balance of an asset (zero when untracked)
    pub fn balance_of(&self, token: &TokenId) -> u64 {
        self.entries
            .iter()
            .find(|e| &e.token == token)
            .map(|e| e.balance)
            .unwrap_or(0)
    }

    /// True if the asset is currently tracked
    pub fn contains(&self, token: &TokenId) -> bool {
        self.entries.iter().any(|e| &e.token == token)
    }

    /// Tracked assets in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &ReserveEntry> {
        self.entries.iter()
    }

    /// Number of tracked assets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of `value_of(token, balance)` over tracked assets.
    ///
    /// Entries at or below the dust floor are excluded, so the reported
    /// value can be strictly less than the sum of historical transfers -
    /// dust is written off.
    pub fn aggregate_value<F>(&self, mut value_of: F) -> EverbondResult<u64>
    where
        F: FnMut(&TokenId, u64) -> EverbondResult<u64>,
    {
        let mut total: u64 = 0;
        for entry in &self.entries {
            if entry.balance <= self.dust_floor {
                continue;
            }
            total = safe_add(total, value_of(&entry.token, entry.balance)?)?;
        }
        Ok(total)
    }
}
