//! Error Types for the Everbond Protocol
//!
//! Typed errors with enough context to diagnose a rejected call.
//! Every error is fatal to the operation that raised it: callers apply
//! effects all-or-nothing, and retries belong to the layer above.

use crate::types::{BondId, ClassKey, TokenId};

/// Result type alias for Everbond operations
pub type EverbondResult<T> = Result<T, EverbondError>;

/// Main error enum for all Everbond protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EverbondError {
    // ============ Bond Queue Errors ============
    /// Candidate bond failed admission (not issuer-recognized, outside the
    /// maturity window, or the queue has no admissible tail)
    UnacceptableBond { bond: BondId, maturity_sec: u64 },

    /// Enqueue would break the strictly-increasing maturity ordering
    QueueOrderViolation { bond: BondId, maturity_sec: u64, tail_maturity_sec: u64 },

    // ============ Issuance Errors ============
    /// Tranche is not part of the current minting bond, or carries zero yield
    UnacceptableDeposit { token: TokenId },

    /// Redemption precondition violated (icebox redemption with a
    /// non-empty queue, or a zero-yield tranche)
    UnacceptableRedemption { token: TokenId },

    /// Rollover legs are invalid: the in-tranche must belong to the minting
    /// bond and the out-token to a bond no longer in the queue
    UnacceptableRollover { token_in: TokenId, token_out: TokenId },

    // ============ Vault Errors ============
    /// Usable collateral below the configured deployment floor
    InsufficientDeployment { usable: u64, minimum: u64 },

    /// Deploy would push the tracked-asset count past the ceiling
    DeployedCountOverLimit { count: usize, limit: usize },

    /// Recovery/transfer target is not a recognized reserve or deployed asset
    UnexpectedAsset { token: TokenId },

    /// A swap would push reserve liquidity outside configured bounds
    LiquidityOutOfBounds { balance: u64, floor: u64 },

    /// A second mutating operation observed a non-idle vault phase
    InvalidStateTransition,

    // ============ Conversion Errors ============
    /// Conversion inputs with a zero divisor (zero price or yield)
    UnacceptableParams,

    // ============ Yield Table Errors ============
    /// Yields for a class are frozen once claims have been minted against it
    YieldFrozen { class: ClassKey },

    /// Yield vector shape does not match the bond class
    InvalidYieldVector { expected: usize, actual: usize },

    // ============ Token Errors ============
    /// Token movement rejected by the transfer collaborator
    TransferFailed { token: TokenId, amount: u64 },

    /// Insufficient balance for operation
    InsufficientBalance { token: TokenId, available: u64, requested: u64 },

    /// Mint would exceed the configured supply ceiling
    SupplyCeiling { requested: u64, ceiling: u64 },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

impl EverbondError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnacceptableBond { .. } => "E001_UNACCEPTABLE_BOND",
            Self::QueueOrderViolation { .. } => "E002_QUEUE_ORDER",
            Self::UnacceptableDeposit { .. } => "E010_UNACCEPTABLE_DEPOSIT",
            Self::UnacceptableRedemption { .. } => "E011_UNACCEPTABLE_REDEMPTION",
            Self::UnacceptableRollover { .. } => "E012_UNACCEPTABLE_ROLLOVER",
            Self::InsufficientDeployment { .. } => "E020_INSUFFICIENT_DEPLOYMENT",
            Self::DeployedCountOverLimit { .. } => "E021_DEPLOYED_OVER_LIMIT",
            Self::UnexpectedAsset { .. } => "E022_UNEXPECTED_ASSET",
            Self::LiquidityOutOfBounds { .. } => "E023_LIQUIDITY_BOUNDS",
            Self::InvalidStateTransition => "E024_INVALID_STATE",
            Self::UnacceptableParams => "E030_UNACCEPTABLE_PARAMS",
            Self::YieldFrozen { .. } => "E040_YIELD_FROZEN",
            Self::InvalidYieldVector { .. } => "E041_INVALID_YIELD_VECTOR",
            Self::TransferFailed { .. } => "E050_TRANSFER_FAILED",
            Self::InsufficientBalance { .. } => "E051_INSUFFICIENT_BALANCE",
            Self::SupplyCeiling { .. } => "E052_SUPPLY_CEILING",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if this error is recoverable (the caller can fix it)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::UnacceptableBond { .. } => true,      // wait for the next issue
            Self::InsufficientDeployment { .. } => true, // accumulate more collateral
            Self::InsufficientBalance { .. } => true,    // get more funds
            Self::LiquidityOutOfBounds { .. } => true,   // smaller swap
            _ => false,
        }
    }
}
