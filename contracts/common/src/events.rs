//! Protocol Events
//!
//! Events are appended to a per-instance log during execution and can be
//! drained by the host for indexing, analytics, and notifications.

use crate::types::{Address, BondId, ClassKey, TokenId};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Queue Events (0x01 - 0x1F)
    BondAdmitted = 0x01,
    BondEvicted = 0x02,

    // Claim Events (0x20 - 0x3F)
    ClaimsMinted = 0x20,
    ClaimsBurned = 0x21,
    ReservePaidOut = 0x22,
    RolloverExecuted = 0x23,

    // Ledger Events (0x40 - 0x5F)
    ReserveSynced = 0x40,
    YieldsSet = 0x41,

    // Vault Events (0x60 - 0x7F)
    SharesMinted = 0x60,
    SharesBurned = 0x61,
    CollateralDeployed = 0x62,
    TrancheRecovered = 0x63,
    SwappedUnderlyingForClaims = 0x64,
    SwappedClaimsForUnderlying = 0x65,
}

/// Main event enum containing all protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum EverbondEvent {
    // ============ Queue Events ============

    /// A bond batch entered the queue at the minting end
    BondAdmitted {
        bond: BondId,
        maturity_sec: u64,
        now_sec: u64,
    },

    /// A bond batch fell out of the maturity window and left the queue
    BondEvicted {
        bond: BondId,
        maturity_sec: u64,
        now_sec: u64,
    },

    // ============ Claim Events ============

    /// Claims minted against a deposited tranche
    ClaimsMinted {
        caller: Address,
        tranche: TokenId,
        tranche_amt: u64,
        claim_amt: u64,
        fee: i64,
        now_sec: u64,
    },

    /// Claims burned by a redemption
    ClaimsBurned {
        caller: Address,
        claim_amt: u64,
        remainder: u64,
        fee: i64,
        now_sec: u64,
    },

    /// A single tranche payout leg of a redemption
    ReservePaidOut {
        token: TokenId,
        amount: u64,
        now_sec: u64,
    },

    /// A rollover exchanged fresh tranches for maturing reserve assets
    RolloverExecuted {
        token_in: TokenId,
        token_out: TokenId,
        amount_in_used: u64,
        amount_out: u64,
        fee: i64,
        now_sec: u64,
    },

    // ============ Ledger Events ============

    /// Reserve membership reconciled for an asset
    ReserveSynced {
        token: TokenId,
        balance: u64,
        tracked: bool,
        now_sec: u64,
    },

    /// Yield factors set for a bond class
    YieldsSet {
        class: ClassKey,
        now_sec: u64,
    },

    // ============ Vault Events ============

    /// Vault shares minted against an underlying deposit
    SharesMinted {
        caller: Address,
        underlying_amt: u64,
        shares: u64,
        fee: i64,
        now_sec: u64,
    },

    /// Vault shares redeemed pro-rata
    SharesBurned {
        caller: Address,
        shares: u64,
        fee: i64,
        now_sec: u64,
    },

    /// Usable collateral tranched and rolled into the reserve
    CollateralDeployed {
        amount: u64,
        now_sec: u64,
    },

    /// A matured deployed tranche redeemed back to underlying
    TrancheRecovered {
        token: TokenId,
        collateral_out: u64,
        now_sec: u64,
    },

    /// Underlying swapped for freshly minted claims
    SwappedUnderlyingForClaims {
        caller: Address,
        underlying_in: u64,
        claims_out: u64,
        now_sec: u64,
    },

    /// Claims swapped for underlying liquidity
    SwappedClaimsForUnderlying {
        caller: Address,
        claims_in: u64,
        underlying_out: u64,
        now_sec: u64,
    },
}

impl EverbondEvent {
    /// Event type for indexing
    pub fn event_type(&self) -> EventType {
        match self {
            Self::BondAdmitted { .. } => EventType::BondAdmitted,
            Self::BondEvicted { .. } => EventType::BondEvicted,
            Self::ClaimsMinted { .. } => EventType::ClaimsMinted,
            Self::ClaimsBurned { .. } => EventType::ClaimsBurned,
            Self::ReservePaidOut { .. } => EventType::ReservePaidOut,
            Self::RolloverExecuted { .. } => EventType::RolloverExecuted,
            Self::ReserveSynced { .. } => EventType::ReserveSynced,
            Self::YieldsSet { .. } => EventType::YieldsSet,
            Self::SharesMinted { .. } => EventType::SharesMinted,
            Self::SharesBurned { .. } => EventType::SharesBurned,
            Self::CollateralDeployed { .. } => EventType::CollateralDeployed,
            Self::TrancheRecovered { .. } => EventType::TrancheRecovered,
            Self::SwappedUnderlyingForClaims { .. } => EventType::SwappedUnderlyingForClaims,
            Self::SwappedClaimsForUnderlying { .. } => EventType::SwappedClaimsForUnderlying,
        }
    }

    /// Timestamp at which the event occurred
    pub fn now_sec(&self) -> u64 {
        match self {
            Self::BondAdmitted { now_sec, .. } => *now_sec,
            Self::BondEvicted { now_sec, .. } => *now_sec,
            Self::ClaimsMinted { now_sec, .. } => *now_sec,
            Self::ClaimsBurned { now_sec, .. } => *now_sec,
            Self::ReservePaidOut { now_sec, .. } => *now_sec,
            Self::RolloverExecuted { now_sec, .. } => *now_sec,
            Self::ReserveSynced { now_sec, .. } => *now_sec,
            Self::YieldsSet { now_sec, .. } => *now_sec,
            Self::SharesMinted { now_sec, .. } => *now_sec,
            Self::SharesBurned { now_sec, .. } => *now_sec,
            Self::CollateralDeployed { now_sec, .. } => *now_sec,
            Self::TrancheRecovered { now_sec, .. } => *now_sec,
            Self::SwappedUnderlyingForClaims { now_sec, .. } => *now_sec,
            Self::SwappedClaimsForUnderlying { now_sec, .. } => *now_sec,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<EverbondEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: EverbondEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[EverbondEvent] {
        &self.events
    }

    /// Take ownership of all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<EverbondEvent> {
        core::mem::take(&mut self.events)
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&EverbondEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
