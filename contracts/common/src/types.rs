//! Core Types for the Everbond Protocol
//!
//! Fundamental data structures shared by the claim-issuance and vault
//! engines. Everything that persists (bonds, supplies) is serde- and
//! borsh-serializable so the host can snapshot state between calls.

use crate::constants::{limits, tranche as tranche_config};
use crate::errors::{EverbondError, EverbondResult};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Type alias for account addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for token identifiers
pub type TokenId = [u8; 32];

/// Type alias for bond identifiers
pub type BondId = [u8; 32];

/// Type alias for bond class keys (collateral + seniority structure)
pub type ClassKey = [u8; 32];

// ============ Bond Types ============

/// A seniority-ordered claim on a bond batch.
///
/// `ratio` is the tranche's share of the bond collateral out of
/// [`tranche_config::RATIO_GRANULARITY`]; index 0 is most senior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Tranche {
    /// Token identifier of this tranche
    pub token: TokenId,
    /// Share of bond collateral, out of RATIO_GRANULARITY
    pub ratio: u16,
}

/// A fixed-maturity instrument holding collateral, split into ordered
/// tranches. Immutable once issued; this core learns about a batch only
/// when it is admitted into the bond queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BondBatch {
    /// Unique identifier assigned by the issuer
    pub id: BondId,
    /// Collateral token backing the batch
    pub collateral_token: TokenId,
    /// Unix timestamp (seconds) at which the batch matures
    pub maturity_sec: u64,
    /// Tranches, most senior first
    pub tranches: Vec<Tranche>,
}

impl BondBatch {
    /// Creates a new bond batch
    pub fn new(
        id: BondId,
        collateral_token: TokenId,
        maturity_sec: u64,
        tranches: Vec<Tranche>,
    ) -> Self {
        Self {
            id,
            collateral_token,
            maturity_sec,
            tranches,
        }
    }

    /// Class key: sha256 over the collateral token and the ordered
    /// seniority ratios. Two batches of the same collateral and split share
    /// a class (and therefore a yield vector) regardless of maturity.
    pub fn class_key(&self) -> ClassKey {
        let mut hasher = Sha256::new();
        hasher.update(self.collateral_token);
        for tranche in &self.tranches {
            hasher.update(tranche.ratio.to_le_bytes());
        }
        hasher.finalize().into()
    }

    /// Seniority index of a tranche token within this batch
    pub fn seniority_of(&self, token: &TokenId) -> Option<usize> {
        self.tranches.iter().position(|t| &t.token == token)
    }

    /// Number of tranches in this batch
    pub fn tranche_count(&self) -> usize {
        self.tranches.len()
    }

    /// The most junior tranche (last in seniority order)
    pub fn most_junior(&self) -> Option<&Tranche> {
        self.tranches.last()
    }

    /// True once the batch has matured
    pub fn is_mature(&self, now_sec: u64) -> bool {
        self.maturity_sec <= now_sec
    }

    /// Structural validation: 1..=MAX_TRANCHES tranches, ratios summing to
    /// the granularity, no duplicate tranche tokens.
    pub fn validate(&self) -> EverbondResult<()> {
        if self.tranches.is_empty() || self.tranches.len() > tranche_config::MAX_TRANCHES {
            return Err(EverbondError::UnacceptableBond {
                bond: self.id,
                maturity_sec: self.maturity_sec,
            });
        }

        let mut ratio_sum: u32 = 0;
        for (i, tranche) in self.tranches.iter().enumerate() {
            ratio_sum += tranche.ratio as u32;
            if self.tranches[..i].iter().any(|t| t.token == tranche.token) {
                return Err(EverbondError::UnacceptableBond {
                    bond: self.id,
                    maturity_sec: self.maturity_sec,
                });
            }
        }

        if ratio_sum != tranche_config::RATIO_GRANULARITY as u32 {
            return Err(EverbondError::UnacceptableBond {
                bond: self.id,
                maturity_sec: self.maturity_sec,
            });
        }

        Ok(())
    }
}

// ============ Supply Types ============

/// Supply tracker for a protocol-native token (claims or vault shares).
///
/// Mutated only by its owning engine; mint/burn totals are cumulative for
/// audit, `total_supply` is the outstanding amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TokenSupply {
    /// Maximum outstanding supply
    pub ceiling: u64,
    /// Current outstanding supply
    pub total_supply: u64,
    /// Cumulative minted
    pub total_minted: u64,
    /// Cumulative burned
    pub total_burned: u64,
}

impl TokenSupply {
    /// Create a supply tracker with an explicit ceiling
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            total_supply: 0,
            total_minted: 0,
            total_burned: 0,
        }
    }

    /// Tracker for the perpetual claim token
    pub fn claims() -> Self {
        Self::new(limits::MAX_CLAIM_SUPPLY)
    }

    /// Tracker for vault shares
    pub fn shares() -> Self {
        Self::new(limits::MAX_SHARE_SUPPLY)
    }

    /// Check if a mint would stay under the ceiling
    pub fn can_mint(&self, amount: u64) -> bool {
        self.total_supply.saturating_add(amount) <= self.ceiling
    }

    /// Record a mint
    pub fn mint(&mut self, amount: u64) -> EverbondResult<()> {
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(EverbondError::Overflow)?;
        if new_supply > self.ceiling {
            return Err(EverbondError::SupplyCeiling {
                requested: amount,
                ceiling: self.ceiling,
            });
        }
        self.total_supply = new_supply;
        self.total_minted = self.total_minted.saturating_add(amount);
        Ok(())
    }

    /// Record a burn
    pub fn burn(&mut self, amount: u64) -> EverbondResult<()> {
        self.total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(EverbondError::Underflow)?;
        self.total_burned = self.total_burned.saturating_add(amount);
        Ok(())
    }
}
