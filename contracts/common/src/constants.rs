//! Protocol Constants
//!
//! All magic numbers and configuration defaults for the Everbond protocol.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (nonzero dust floor, higher deployment minimums)
//! - Default (no feature) - Testnet values (lower minimums for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! everbond-common = { path = "...", features = ["mainnet"] }
//! ```

/// Claim token metadata
pub mod token {
    /// Token name
    pub const NAME: &str = "Everbond Perpetual";
    /// Token symbol
    pub const SYMBOL: &str = "EVP";
    /// Decimal places (matches the underlying collateral convention)
    pub const DECIMALS: u8 = 9;
    /// One unit with decimals (1 EVP = 1_000_000_000 base units)
    pub const ONE: u64 = 1_000_000_000;
}

/// Vault share metadata
pub mod share {
    /// Share name
    pub const NAME: &str = "Everbond Vault Share";
    /// Share symbol
    pub const SYMBOL: &str = "EVS";
    /// Shares minted per underlying unit when total supply is zero
    pub const INITIAL_SHARES_PER_UNIT: u64 = 1_000_000;
}

/// Fixed-point scales for the conversion engine
pub mod fixed_point {
    /// Decimal places of a yield factor
    pub const YIELD_SCALE: u32 = 6;

    /// One yield unit (100% yield)
    pub const YIELD_ONE: u64 = 1_000_000;

    /// Decimal places of a tranche price
    pub const PRICE_SCALE: u32 = 18;

    /// One price unit (1.0 in the unit of account)
    pub const PRICE_ONE: u64 = 1_000_000_000_000_000_000;
}

/// Tranche structure parameters
pub mod tranche {
    /// Seniority ratios are expressed out of this granularity
    /// (a 20%/80% bond has ratios [200, 800])
    pub const RATIO_GRANULARITY: u16 = 1_000;

    /// Maximum number of tranches per bond
    pub const MAX_TRANCHES: usize = 8;
}

/// Maturity window defaults (seconds, relative to current time)
pub mod maturity {
    /// Default lower bound: bonds must have at least this long to maturity
    pub const DEFAULT_MIN_MATURITY_SEC: u64 = 7 * 24 * 3_600;

    /// Default upper bound: bonds maturing at or past this horizon are rejected
    pub const DEFAULT_MAX_MATURITY_SEC: u64 = 35 * 24 * 3_600;
}

/// Reserve ledger configuration
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod reserve {
    /// Dust floor: balances at or below this are dropped from the ledger
    /// - Mainnet: 1,000 base units (suppresses rounding residue)
    /// - Testnet: 0 (track any positive balance)
    #[cfg(feature = "mainnet")]
    pub const DUST_FLOOR: u64 = 1_000;
    #[cfg(not(feature = "mainnet"))]
    pub const DUST_FLOOR: u64 = 0;

    /// Maximum number of assets a single ledger will track
    pub const MAX_TRACKED_ASSETS: usize = 32;
}

/// Vault deployment configuration
pub mod deployment {
    use super::token::ONE;

    /// Minimum usable collateral required for a deploy
    /// - Mainnet: 1,000 units (keeps rollover batches economical)
    /// - Testnet: 1 unit
    #[cfg(feature = "mainnet")]
    pub const MIN_DEPLOYMENT: u64 = 1_000 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const MIN_DEPLOYMENT: u64 = 1 * ONE;

    /// Default ceiling on tranche assets deployed at once
    pub const MAX_DEPLOYED_ASSETS: usize = 16;

    /// Default underlying balance kept undeployed as redemption liquidity
    pub const DEFAULT_RESERVED_BALANCE: u64 = 0;
}

/// Supply limits
pub mod limits {
    use super::token::ONE;

    /// Maximum claim supply (10 billion EVP - fits in u64)
    pub const MAX_CLAIM_SUPPLY: u64 = 10_000_000_000 * ONE;

    /// Maximum vault share supply
    pub const MAX_SHARE_SUPPLY: u64 = u64::MAX / 2;

    /// Helper to check if running in mainnet mode
    #[cfg(feature = "mainnet")]
    pub const IS_MAINNET: bool = true;
    #[cfg(not(feature = "mainnet"))]
    pub const IS_MAINNET: bool = false;
}
