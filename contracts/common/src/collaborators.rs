//! Collaborator Interfaces
//!
//! Narrow traits for everything this core consumes but does not implement:
//! bond issuance, fee policy, pricing, and asset transfer. Implementations
//! are injected per call, so an administrator swapping a policy takes
//! effect on the next call, never retroactively. Collaborator side effects
//! fall inside the caller's atomic boundary; their failures propagate as
//! call failures with no retry.

use crate::errors::EverbondResult;
use crate::types::{Address, BondBatch, BondId, TokenId};
use crate::Vec;

/// Trusted bond issuer / factory.
pub trait BondIssuer {
    /// The most recently issued bond batch, if any
    fn latest_bond(&self) -> Option<BondBatch>;

    /// True if the batch was genuinely issued by this issuer
    fn is_instance(&self, bond: &BondBatch) -> bool;

    /// Split collateral held by `depositor` into tranche tokens of `bond`,
    /// one amount per seniority (most senior first). The issuer takes
    /// custody of the collateral and credits the tranche tokens to the
    /// depositor.
    fn tranche(
        &mut self,
        bond: &BondBatch,
        depositor: &Address,
        collateral_amt: u64,
    ) -> EverbondResult<Vec<u64>>;

    /// Redeem `amount` of a matured bond's tranche token held by `holder`
    /// for underlying collateral; returns the collateral credited.
    fn redeem_mature(
        &mut self,
        bond: &BondId,
        token: &TokenId,
        holder: &Address,
        amount: u64,
    ) -> EverbondResult<u64>;
}

/// Fee/reward policy. Percentages are signed fixed-point values at
/// `decimals()` places: positive is owed by the caller, negative is owed to
/// the caller.
pub trait FeePolicy {
    /// Decimal places of the returned percentages
    fn decimals(&self) -> u8;

    /// Fee on claim minting
    fn mint_fee_perc(&self) -> i64;

    /// Fee on claim burning
    fn burn_fee_perc(&self) -> i64;

    /// Fee (or reward, when negative) on a rollover, given the
    /// claim-equivalent value exchanged
    fn rollover_fee_perc(&self, claim_equivalent: u64) -> i64;

    /// Fee on vault share minting
    fn vault_mint_fee_perc(&self) -> i64;

    /// Fee on vault share burning
    fn vault_burn_fee_perc(&self) -> i64;
}

/// Market pricing source, fixed-point at PRICE_SCALE.
pub trait PricingSource {
    /// Price of one tranche token unit in the unit of account
    fn tranche_price(&self, token: &TokenId) -> u64;

    /// Price of one claim token unit in the unit of account
    fn claim_price(&self) -> u64;
}

/// Asset transfer primitive. `reserve` accounts are owned by the engines;
/// every balance-affecting call is followed by a ledger sync.
pub trait TokenGateway {
    /// Move tokens from a holder into a reserve account
    fn pull(
        &mut self,
        token: &TokenId,
        from: &Address,
        reserve: &Address,
        amount: u64,
    ) -> EverbondResult<()>;

    /// Move tokens out of a reserve account to a holder
    fn push(
        &mut self,
        token: &TokenId,
        reserve: &Address,
        to: &Address,
        amount: u64,
    ) -> EverbondResult<()>;

    /// Mint protocol-native tokens to a holder
    fn mint(&mut self, token: &TokenId, to: &Address, amount: u64) -> EverbondResult<()>;

    /// Burn protocol-native tokens from a holder
    fn burn(&mut self, token: &TokenId, from: &Address, amount: u64) -> EverbondResult<()>;

    /// Current balance of a holder
    fn balance_of(&self, token: &TokenId, holder: &Address) -> u64;
}

/// The full collaborator set an operation runs against, bundled so engine
/// signatures stay flat.
pub struct Collaborators<'a> {
    /// Bond issuer / factory
    pub issuer: &'a mut dyn BondIssuer,
    /// Fee/reward policy
    pub fees: &'a dyn FeePolicy,
    /// Pricing source
    pub pricing: &'a dyn PricingSource,
    /// Asset transfer primitive
    pub gateway: &'a mut dyn TokenGateway,
}
