//! Test Collaborators
//!
//! In-memory implementations of the collaborator traits for exercising the
//! engines in tests and simulations. A single [`SharedBalances`] book is
//! shared between the gateway and the issuer so collateral consumed by
//! tranching and tokens moved by transfers stay consistent.
//!
//! Only available with the `std` feature.

use crate::collaborators::{BondIssuer, FeePolicy, PricingSource, TokenGateway};
use crate::constants::fixed_point::PRICE_ONE;
use crate::constants::tranche::RATIO_GRANULARITY;
use crate::errors::{EverbondError, EverbondResult};
use crate::types::{Address, BondBatch, BondId, TokenId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::vec::Vec;

/// Shared in-memory balance book: (token, holder) -> balance
pub type SharedBalances = Rc<RefCell<BTreeMap<(TokenId, Address), u64>>>;

/// Create an empty shared balance book
pub fn shared_balances() -> SharedBalances {
    Rc::new(RefCell::new(BTreeMap::new()))
}

/// Read a balance from the book
pub fn balance(book: &SharedBalances, token: &TokenId, holder: &Address) -> u64 {
    *book.borrow().get(&(*token, *holder)).unwrap_or(&0)
}

/// Credit a balance in the book (test setup)
pub fn credit(book: &SharedBalances, token: &TokenId, holder: &Address, amount: u64) {
    *book.borrow_mut().entry((*token, *holder)).or_insert(0) += amount;
}

fn debit(book: &SharedBalances, token: &TokenId, holder: &Address, amount: u64) -> EverbondResult<()> {
    let mut book = book.borrow_mut();
    let entry = book.entry((*token, *holder)).or_insert(0);
    if *entry < amount {
        return Err(EverbondError::InsufficientBalance {
            token: *token,
            available: *entry,
            requested: amount,
        });
    }
    *entry -= amount;
    Ok(())
}

/// Gateway over the shared balance book
pub struct MockGateway {
    pub book: SharedBalances,
}

impl TokenGateway for MockGateway {
    fn pull(
        &mut self,
        token: &TokenId,
        from: &Address,
        reserve: &Address,
        amount: u64,
    ) -> EverbondResult<()> {
        debit(&self.book, token, from, amount)?;
        credit(&self.book, token, reserve, amount);
        Ok(())
    }

    fn push(
        &mut self,
        token: &TokenId,
        reserve: &Address,
        to: &Address,
        amount: u64,
    ) -> EverbondResult<()> {
        debit(&self.book, token, reserve, amount)?;
        credit(&self.book, token, to, amount);
        Ok(())
    }

    fn mint(&mut self, token: &TokenId, to: &Address, amount: u64) -> EverbondResult<()> {
        credit(&self.book, token, to, amount);
        Ok(())
    }

    fn burn(&mut self, token: &TokenId, from: &Address, amount: u64) -> EverbondResult<()> {
        debit(&self.book, token, from, amount)
    }

    fn balance_of(&self, token: &TokenId, holder: &Address) -> u64 {
        balance(&self.book, token, holder)
    }
}

/// Issuer over the shared balance book. Bonds are issued by tests through
/// [`MockIssuer::issue`]; tranching splits collateral at the bond's ratios
/// and matured tranches redeem 1:1 for collateral.
pub struct MockIssuer {
    pub book: SharedBalances,
    pub bonds: Vec<BondBatch>,
}

impl MockIssuer {
    /// Create an issuer with no bonds issued yet
    pub fn new(book: SharedBalances) -> Self {
        Self { book, bonds: Vec::new() }
    }

    /// Record a freshly issued bond; the latest issue becomes `latest_bond`
    pub fn issue(&mut self, bond: BondBatch) {
        self.bonds.push(bond);
    }

    fn find(&self, id: &BondId) -> Option<&BondBatch> {
        self.bonds.iter().find(|b| &b.id == id)
    }
}

impl BondIssuer for MockIssuer {
    fn latest_bond(&self) -> Option<BondBatch> {
        self.bonds.last().cloned()
    }

    fn is_instance(&self, bond: &BondBatch) -> bool {
        self.find(&bond.id).is_some()
    }

    fn tranche(
        &mut self,
        bond: &BondBatch,
        depositor: &Address,
        collateral_amt: u64,
    ) -> EverbondResult<Vec<u64>> {
        if self.find(&bond.id).is_none() {
            return Err(EverbondError::UnacceptableBond {
                bond: bond.id,
                maturity_sec: bond.maturity_sec,
            });
        }
        debit(&self.book, &bond.collateral_token, depositor, collateral_amt)?;

        let mut amounts = Vec::with_capacity(bond.tranches.len());
        for tranche in &bond.tranches {
            let amount = (collateral_amt as u128 * tranche.ratio as u128
                / RATIO_GRANULARITY as u128) as u64;
            credit(&self.book, &tranche.token, depositor, amount);
            amounts.push(amount);
        }
        Ok(amounts)
    }

    fn redeem_mature(
        &mut self,
        bond: &BondId,
        token: &TokenId,
        holder: &Address,
        amount: u64,
    ) -> EverbondResult<u64> {
        let batch = self
            .find(bond)
            .ok_or(EverbondError::UnexpectedAsset { token: *token })?;
        if batch.seniority_of(token).is_none() {
            return Err(EverbondError::UnexpectedAsset { token: *token });
        }
        let collateral_token = batch.collateral_token;
        debit(&self.book, token, holder, amount)?;
        credit(&self.book, &collateral_token, holder, amount);
        Ok(amount)
    }
}

/// Fee policy returning flat percentages
pub struct FlatFees {
    pub decimals: u8,
    pub mint: i64,
    pub burn: i64,
    pub rollover: i64,
    pub vault_mint: i64,
    pub vault_burn: i64,
}

impl FlatFees {
    /// Zero fees everywhere, 6-decimal percentages
    pub fn zero() -> Self {
        Self {
            decimals: 6,
            mint: 0,
            burn: 0,
            rollover: 0,
            vault_mint: 0,
            vault_burn: 0,
        }
    }
}

impl FeePolicy for FlatFees {
    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn mint_fee_perc(&self) -> i64 {
        self.mint
    }

    fn burn_fee_perc(&self) -> i64 {
        self.burn
    }

    fn rollover_fee_perc(&self, _claim_equivalent: u64) -> i64 {
        self.rollover
    }

    fn vault_mint_fee_perc(&self) -> i64 {
        self.vault_mint
    }

    fn vault_burn_fee_perc(&self) -> i64 {
        self.vault_burn
    }
}

/// Pricing source with per-token overrides and a par default
pub struct FlatPricing {
    pub overrides: BTreeMap<TokenId, u64>,
    pub default_price: u64,
    pub claim: u64,
}

impl FlatPricing {
    /// Everything at par
    pub fn par() -> Self {
        Self {
            overrides: BTreeMap::new(),
            default_price: PRICE_ONE,
            claim: PRICE_ONE,
        }
    }

    /// Override one token's price
    pub fn set(&mut self, token: TokenId, price: u64) {
        self.overrides.insert(token, price);
    }
}

impl PricingSource for FlatPricing {
    fn tranche_price(&self, token: &TokenId) -> u64 {
        *self.overrides.get(token).unwrap_or(&self.default_price)
    }

    fn claim_price(&self) -> u64 {
        self.claim
    }
}
