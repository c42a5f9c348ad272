//! Claim Issuance Engine
//!
//! Mints and redeems the perpetual claim token against a rotating FIFO
//! queue of seniority-tranched bonds.
//!
//! ## Core Operations
//!
//! - **deposit**: Tranche in, claims out, against the minting (tail) bond
//! - **redeem**: Claims in, tranches out, walking the burning (head) bond
//! - **redeem_icebox**: Single-tranche redemption once the queue is empty
//! - **rollover**: Fresh tranches in, maturing reserve assets out, at
//!   equivalent converted value
//! - **get_minting_bond / get_burning_bond**: Queue advancement
//!
//! ## Atomicity
//!
//! Operations validate and convert before they move anything, so a
//! rejected call leaves the state untouched. Mid-flight collaborator
//! failures propagate to the host, which is expected to apply each call
//! against a snapshot (every state type is `Clone`) and discard it on
//! error - there is no compensating-transaction path in here.

use everbond_common::collaborators::{BondIssuer, Collaborators, TokenGateway};
use everbond_common::constants::{maturity, reserve as reserve_config};
use everbond_common::conversion::{claim_to_tranches, tranches_to_claim};
use everbond_common::errors::{EverbondError, EverbondResult};
use everbond_common::events::{EventLog, EverbondEvent};
use everbond_common::math::{mul_div_floor, signed_perc_of, to_amount};
use everbond_common::queue::BondQueue;
use everbond_common::reserve::{ReserveLedger, SyncOutcome};
use everbond_common::types::{Address, BondBatch, ClassKey, TokenId, TokenSupply};
use everbond_common::yields::YieldTable;
use everbond_common::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Static configuration for a claim issuance engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PerpConfig {
    /// The perpetual claim token this engine mints and burns
    pub claim_token: TokenId,
    /// Account holding the reserve (and the engine's own claim balance,
    /// which doubles as the fee pot)
    pub reserve_account: Address,
    /// Lower bound of the admission window, seconds to maturity
    pub min_maturity_sec: u64,
    /// Upper bound of the admission window, seconds to maturity
    pub max_maturity_sec: u64,
    /// Reserve dust floor
    pub dust_floor: u64,
}

impl PerpConfig {
    /// Configuration with protocol-default window and dust floor
    pub fn new(claim_token: TokenId, reserve_account: Address) -> Self {
        Self {
            claim_token,
            reserve_account,
            min_maturity_sec: maturity::DEFAULT_MIN_MATURITY_SEC,
            max_maturity_sec: maturity::DEFAULT_MAX_MATURITY_SEC,
            dust_floor: reserve_config::DUST_FLOOR,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutable state of a claim issuance engine.
///
/// One instance owns the queue, the reserve ledger, the yield table, and
/// the claim supply; callers borrow it mutably per operation, which makes
/// the single-writer requirement structural.
#[derive(Debug, Clone)]
pub struct PerpState {
    /// Static configuration
    pub config: PerpConfig,
    /// Maturity-ordered bond queue
    pub queue: BondQueue,
    /// Bonds evicted from the queue whose tranches may still sit in the
    /// reserve; icebox redemption and rollover targets come from here
    pub retired: Vec<BondBatch>,
    /// Asset balances backing the outstanding claims
    pub reserve: ReserveLedger,
    /// Per-class yield factors
    pub yields: YieldTable,
    /// Outstanding claim supply
    pub supply: TokenSupply,
    /// Event log for this instance
    pub events: EventLog,
}

impl PerpState {
    /// Create a fresh engine from a fully-formed configuration
    pub fn new(config: PerpConfig) -> Self {
        let queue = BondQueue::new(config.min_maturity_sec, config.max_maturity_sec);
        let reserve = ReserveLedger::new(config.dust_floor);
        Self {
            config,
            queue,
            retired: Vec::new(),
            reserve,
            yields: YieldTable::new(),
            supply: TokenSupply::claims(),
            events: EventLog::new(),
        }
    }

    /// Locate the bond (queued or retired) a tranche token belongs to,
    /// along with its seniority index
    pub fn find_bond_of(&self, token: &TokenId) -> Option<(BondBatch, usize)> {
        for bond in self.queue.iter().chain(self.retired.iter()) {
            if let Some(seniority) = bond.seniority_of(token) {
                return Some((bond.clone(), seniority));
            }
        }
        None
    }

    /// Reserve tranches eligible as rollover outputs: holdings of retired
    /// bonds, nearest maturity first, seniors before juniors
    pub fn rollover_targets(&self) -> Vec<TokenId> {
        let mut targets = Vec::new();
        for bond in &self.retired {
            for tranche in &bond.tranches {
                if self.reserve.balance_of(&tranche.token) > self.reserve.dust_floor() {
                    targets.push(tranche.token);
                }
            }
        }
        targets
    }

    /// Forget retired bonds with no remaining reserve holdings
    fn prune_retired(&mut self) {
        let reserve = &self.reserve;
        self.retired
            .retain(|b| {
                b.tranches
                    .iter()
                    .any(|t| reserve.balance_of(&t.token) > reserve.dust_floor())
            });
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositResult {
    /// Claims minted to the caller
    pub claim_minted: u64,
    /// Signed fee settled (positive collected, negative paid out)
    pub fee: i64,
}

/// One tranche payout leg of a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionLeg {
    /// Tranche token paid out
    pub token: TokenId,
    /// Amount paid out
    pub amount: u64,
}

/// Outcome of a redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemResult {
    /// Claims actually burned (`requested - remainder`)
    pub claim_burned: u64,
    /// Signed fee settled
    pub fee: i64,
    /// Payout legs in queue-head-first, seniority order
    pub payouts: Vec<RedemptionLeg>,
    /// Portion of the request the reserve could not satisfy
    pub remainder: u64,
}

impl RedeemResult {
    fn no_op(requested: u64) -> Self {
        Self {
            claim_burned: 0,
            fee: 0,
            payouts: Vec::new(),
            remainder: requested,
        }
    }
}

/// Outcome of a rollover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverResult {
    /// Input tranches actually consumed (partial fills cap at the
    /// reserve's holding of the out token)
    pub tranche_in_used: u64,
    /// Out tokens paid from the reserve
    pub token_out_amt: u64,
    /// Signed fee settled on the claim-equivalent value
    pub fee: i64,
}

impl RolloverResult {
    fn no_op() -> Self {
        Self {
            tranche_in_used: 0,
            token_out_amt: 0,
            fee: 0,
        }
    }
}

// ============================================================================
// Admin Operations
// ============================================================================

/// Set the yield vector for a bond class. Rejected with `YieldFrozen` once
/// claims have been minted against the class.
pub fn set_class_yields(
    state: &mut PerpState,
    class: ClassKey,
    factors: Vec<u64>,
    now_sec: u64,
) -> EverbondResult<()> {
    state.yields.set_class_yields(class, factors)?;
    state.events.emit(EverbondEvent::YieldsSet { class, now_sec });
    Ok(())
}

// ============================================================================
// Queue Operations
// ============================================================================

/// The bond deposits mint against: the queue tail, advanced first.
///
/// If the issuer has a newer bond that is not yet queued, it is validated
/// and - when admissible - appended (idempotently; evicted bonds are never
/// re-admitted). Fails with `UnacceptableBond` when the candidate is not
/// recognized as the issuer's, or when the resulting tail is absent or
/// inadmissible.
pub fn get_minting_bond(
    state: &mut PerpState,
    issuer: &dyn BondIssuer,
    now_sec: u64,
) -> EverbondResult<BondBatch> {
    if let Some(candidate) = issuer.latest_bond() {
        let queued = state.queue.contains(&candidate.id);
        let was_retired = state.retired.iter().any(|b| b.id == candidate.id);
        if !queued && !was_retired {
            if !issuer.is_instance(&candidate) {
                return Err(EverbondError::UnacceptableBond {
                    bond: candidate.id,
                    maturity_sec: candidate.maturity_sec,
                });
            }
            candidate.validate()?;
            if state.queue.is_admissible(&candidate, now_sec) {
                let bond = candidate.id;
                let maturity_sec = candidate.maturity_sec;
                if state.queue.enqueue(candidate)? {
                    state.events.emit(EverbondEvent::BondAdmitted {
                        bond,
                        maturity_sec,
                        now_sec,
                    });
                }
            }
        }
    }

    match state.queue.tail() {
        Some(tail) if state.queue.is_admissible(tail, now_sec) => Ok(tail.clone()),
        Some(tail) => Err(EverbondError::UnacceptableBond {
            bond: tail.id,
            maturity_sec: tail.maturity_sec,
        }),
        None => Err(EverbondError::UnacceptableBond {
            bond: [0u8; 32],
            maturity_sec: 0,
        }),
    }
}

/// The bond redemptions burn against: the queue head, after evicting every
/// head that has dropped out of the maturity window. Returns `None` when
/// the queue empties out.
pub fn get_burning_bond(state: &mut PerpState, now_sec: u64) -> Option<BondBatch> {
    let evicted = state.queue.evict_inadmissible(now_sec);
    for bond in evicted {
        state.events.emit(EverbondEvent::BondEvicted {
            bond: bond.id,
            maturity_sec: bond.maturity_sec,
            now_sec,
        });
        state.retired.push(bond);
    }
    state.queue.head().cloned()
}

// ============================================================================
// Claim Operations
// ============================================================================

/// Deposit tranches of the minting bond, minting claims to the caller.
///
/// A zero amount or a conversion that floors to zero claims is a no-op.
/// `UnacceptableDeposit` if the tranche is not part of the minting bond or
/// its yield is zero.
pub fn deposit(
    state: &mut PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    tranche_token: TokenId,
    amount: u64,
    now_sec: u64,
) -> EverbondResult<DepositResult> {
    if amount == 0 {
        return Ok(DepositResult { claim_minted: 0, fee: 0 });
    }

    let minting = get_minting_bond(state, &*collab.issuer, now_sec)?;
    let seniority = minting
        .seniority_of(&tranche_token)
        .ok_or(EverbondError::UnacceptableDeposit { token: tranche_token })?;
    let class = minting.class_key();
    let yield_factor = state.yields.factor(&class, seniority);
    if yield_factor == 0 {
        return Err(EverbondError::UnacceptableDeposit { token: tranche_token });
    }

    let price = collab.pricing.tranche_price(&tranche_token);
    let claim_amt = tranches_to_claim(amount, yield_factor, price)?;
    if claim_amt == 0 {
        return Ok(DepositResult { claim_minted: 0, fee: 0 });
    }

    collab
        .gateway
        .pull(&tranche_token, caller, &state.config.reserve_account, amount)?;
    sync_reserve_asset(state, &*collab.gateway, &tranche_token, now_sec)?;

    state.supply.mint(claim_amt)?;
    collab
        .gateway
        .mint(&state.config.claim_token, caller, claim_amt)?;
    state.yields.mark_used(&class);

    let fee = settle_claim_fee(
        state,
        &mut *collab.gateway,
        caller,
        claim_amt,
        collab.fees.mint_fee_perc(),
        collab.fees.decimals(),
    )?;

    state.events.emit(EverbondEvent::ClaimsMinted {
        caller: *caller,
        tranche: tranche_token,
        tranche_amt: amount,
        claim_amt,
        fee,
        now_sec,
    });

    Ok(DepositResult { claim_minted: claim_amt, fee })
}

/// Redeem claims against the reserve, walking the burning bond head-first
/// in seniority order.
///
/// Per tranche, the payout is `min(claim_to_tranches(remainder), held)`
/// and the remainder shrinks by the fraction actually satisfied. A fully
/// drained head is dequeued and the walk continues; the walk stops when
/// the remainder hits zero or the queue empties. Burns
/// `requested - remainder` net of the signed burn fee.
pub fn redeem(
    state: &mut PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    requested: u64,
    now_sec: u64,
) -> EverbondResult<RedeemResult> {
    if requested == 0 {
        return Ok(RedeemResult::no_op(0));
    }

    let mut remainder = requested;
    let mut payouts: Vec<RedemptionLeg> = Vec::new();

    while remainder > 0 {
        let Some(head) = get_burning_bond(state, now_sec) else {
            break;
        };
        let class = head.class_key();

        for (seniority, tranche) in head.tranches.iter().enumerate() {
            if remainder == 0 {
                break;
            }
            let yield_factor = state.yields.factor(&class, seniority);
            if yield_factor == 0 {
                continue;
            }
            let held = state.reserve.balance_of(&tranche.token);
            if held == 0 {
                continue;
            }

            let price = collab.pricing.tranche_price(&tranche.token);
            let computed = claim_to_tranches(remainder, yield_factor, price)?;
            if computed == 0 {
                continue;
            }
            let used = computed.min(held);

            collab
                .gateway
                .push(&tranche.token, &state.config.reserve_account, caller, used)?;
            sync_reserve_asset(state, &*collab.gateway, &tranche.token, now_sec)?;
            payouts.push(RedemptionLeg { token: tranche.token, amount: used });
            state.events.emit(EverbondEvent::ReservePaidOut {
                token: tranche.token,
                amount: used,
                now_sec,
            });

            remainder = to_amount(mul_div_floor(
                remainder as u128,
                (computed - used) as u128,
                computed as u128,
            )?)?;
        }

        if remainder == 0 {
            break;
        }

        // Continue into the next bond only when this head has nothing left
        // to give; a head kept alive by zero-yield tranches ends the walk
        let drained = head
            .tranches
            .iter()
            .all(|t| state.reserve.balance_of(&t.token) <= state.reserve.dust_floor());
        if !drained {
            break;
        }
        if let Some(bond) = state.queue.dequeue() {
            state.events.emit(EverbondEvent::BondEvicted {
                bond: bond.id,
                maturity_sec: bond.maturity_sec,
                now_sec,
            });
            state.retired.push(bond);
        }
    }

    let realized = requested - remainder;
    if realized > 0 {
        collab
            .gateway
            .burn(&state.config.claim_token, caller, realized)?;
        state.supply.burn(realized)?;
    }

    let fee = settle_claim_fee(
        state,
        &mut *collab.gateway,
        caller,
        realized,
        collab.fees.burn_fee_perc(),
        collab.fees.decimals(),
    )?;

    state.prune_retired();
    state.events.emit(EverbondEvent::ClaimsBurned {
        caller: *caller,
        claim_amt: realized,
        remainder,
        fee,
        now_sec,
    });

    Ok(RedeemResult {
        claim_burned: realized,
        fee,
        payouts,
        remainder,
    })
}

/// Redeem claims against a single retired tranche holding.
///
/// Only permitted once the queue is fully empty - while queue redemption
/// is possible, off-queue holdings stay locked. `UnexpectedAsset` if the
/// token is not a retired reserve holding.
pub fn redeem_icebox(
    state: &mut PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    tranche_token: TokenId,
    requested: u64,
    now_sec: u64,
) -> EverbondResult<RedeemResult> {
    if requested == 0 {
        return Ok(RedeemResult::no_op(0));
    }

    if get_burning_bond(state, now_sec).is_some() {
        return Err(EverbondError::UnacceptableRedemption { token: tranche_token });
    }

    let (bond, seniority) = state
        .find_bond_of(&tranche_token)
        .ok_or(EverbondError::UnexpectedAsset { token: tranche_token })?;
    let yield_factor = state.yields.factor(&bond.class_key(), seniority);
    if yield_factor == 0 {
        return Err(EverbondError::UnacceptableRedemption { token: tranche_token });
    }
    let held = state.reserve.balance_of(&tranche_token);
    if held == 0 {
        return Err(EverbondError::UnexpectedAsset { token: tranche_token });
    }

    let price = collab.pricing.tranche_price(&tranche_token);
    let computed = claim_to_tranches(requested, yield_factor, price)?;
    if computed == 0 {
        return Ok(RedeemResult::no_op(requested));
    }
    let used = computed.min(held);

    collab
        .gateway
        .push(&tranche_token, &state.config.reserve_account, caller, used)?;
    sync_reserve_asset(state, &*collab.gateway, &tranche_token, now_sec)?;
    state.events.emit(EverbondEvent::ReservePaidOut {
        token: tranche_token,
        amount: used,
        now_sec,
    });

    let remainder = to_amount(mul_div_floor(
        requested as u128,
        (computed - used) as u128,
        computed as u128,
    )?)?;
    let realized = requested - remainder;
    if realized > 0 {
        collab
            .gateway
            .burn(&state.config.claim_token, caller, realized)?;
        state.supply.burn(realized)?;
    }

    let fee = settle_claim_fee(
        state,
        &mut *collab.gateway,
        caller,
        realized,
        collab.fees.burn_fee_perc(),
        collab.fees.decimals(),
    )?;

    state.prune_retired();
    state.events.emit(EverbondEvent::ClaimsBurned {
        caller: *caller,
        claim_amt: realized,
        remainder,
        fee,
        now_sec,
    });

    Ok(RedeemResult {
        claim_burned: realized,
        fee,
        payouts: [RedemptionLeg { token: tranche_token, amount: used }].into(),
        remainder,
    })
}

/// Exchange tranches of the minting bond for maturing reserve assets at
/// equivalent converted value.
///
/// The out leg must belong to a bond no longer in the queue. The out
/// amount caps at the reserve's holding; the consumed input scales down
/// accordingly, so one input can be spread across several targets by
/// repeated calls. No claim supply change; the signed rollover fee (a
/// reward when negative) settles on the claim-equivalent value.
pub fn rollover(
    state: &mut PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    tranche_in: TokenId,
    token_out: TokenId,
    amount_in: u64,
    now_sec: u64,
) -> EverbondResult<RolloverResult> {
    if amount_in == 0 {
        return Ok(RolloverResult::no_op());
    }

    // Advance both ends so queue membership is judged on fresh state
    let _ = get_burning_bond(state, now_sec);
    let minting = get_minting_bond(state, &*collab.issuer, now_sec)?;

    let seniority_in = minting
        .seniority_of(&tranche_in)
        .ok_or(EverbondError::UnacceptableRollover { token_in: tranche_in, token_out })?;

    let (out_bond, seniority_out) = match state.find_bond_of(&token_out) {
        Some((bond, seniority)) => {
            if state.queue.contains(&bond.id) {
                return Err(EverbondError::UnacceptableRollover {
                    token_in: tranche_in,
                    token_out,
                });
            }
            (bond, seniority)
        }
        None => return Err(EverbondError::UnexpectedAsset { token: token_out }),
    };

    let yield_in = state.yields.factor(&minting.class_key(), seniority_in);
    let yield_out = state.yields.factor(&out_bond.class_key(), seniority_out);
    if yield_in == 0 || yield_out == 0 {
        return Err(EverbondError::UnacceptableRollover {
            token_in: tranche_in,
            token_out,
        });
    }

    let price_in = collab.pricing.tranche_price(&tranche_in);
    let price_out = collab.pricing.tranche_price(&token_out);

    let claim_eq_full = tranches_to_claim(amount_in, yield_in, price_in)?;
    if claim_eq_full == 0 {
        return Ok(RolloverResult::no_op());
    }
    let out_full = claim_to_tranches(claim_eq_full, yield_out, price_out)?;
    let held_out = state.reserve.balance_of(&token_out);

    let (tranche_in_used, token_out_amt, claim_equivalent) = if out_full <= held_out {
        (amount_in, out_full, claim_eq_full)
    } else {
        let claim_eq = tranches_to_claim(held_out, yield_out, price_out)?;
        let used_in = claim_to_tranches(claim_eq, yield_in, price_in)?;
        (used_in, held_out, claim_eq)
    };
    if tranche_in_used == 0 || token_out_amt == 0 {
        return Ok(RolloverResult::no_op());
    }

    collab
        .gateway
        .pull(&tranche_in, caller, &state.config.reserve_account, tranche_in_used)?;
    sync_reserve_asset(state, &*collab.gateway, &tranche_in, now_sec)?;

    collab
        .gateway
        .push(&token_out, &state.config.reserve_account, caller, token_out_amt)?;
    sync_reserve_asset(state, &*collab.gateway, &token_out, now_sec)?;

    let fee = settle_claim_fee(
        state,
        &mut *collab.gateway,
        caller,
        claim_equivalent,
        collab.fees.rollover_fee_perc(claim_equivalent),
        collab.fees.decimals(),
    )?;

    state.prune_retired();
    state.events.emit(EverbondEvent::RolloverExecuted {
        token_in: tranche_in,
        token_out,
        amount_in_used: tranche_in_used,
        amount_out: token_out_amt,
        fee,
        now_sec,
    });

    Ok(RolloverResult {
        tranche_in_used,
        token_out_amt,
        fee,
    })
}

// ============================================================================
// Internal Helpers
// ============================================================================

/// Re-read an asset's reserve balance from the gateway and reconcile the
/// ledger; called after every balance-affecting transfer
fn sync_reserve_asset(
    state: &mut PerpState,
    gateway: &dyn TokenGateway,
    token: &TokenId,
    now_sec: u64,
) -> EverbondResult<SyncOutcome> {
    let balance = gateway.balance_of(token, &state.config.reserve_account);
    let outcome = state.reserve.sync(*token, balance)?;
    let tracked = matches!(outcome, SyncOutcome::Added | SyncOutcome::Updated);
    state.events.emit(EverbondEvent::ReserveSynced {
        token: *token,
        balance,
        tracked,
        now_sec,
    });
    Ok(outcome)
}

/// Settle a signed fee in claim tokens. Positive fees are collected from
/// the payer into the engine's own claim balance; negative fees are paid
/// out of that balance, capped at what it holds. Returns the amount
/// actually settled.
fn settle_claim_fee(
    state: &mut PerpState,
    gateway: &mut dyn TokenGateway,
    payer: &Address,
    amount: u64,
    perc: i64,
    decimals: u8,
) -> EverbondResult<i64> {
    let fee = signed_perc_of(amount, perc, decimals)?;
    if fee > 0 {
        gateway.pull(
            &state.config.claim_token,
            payer,
            &state.config.reserve_account,
            fee as u64,
        )?;
        Ok(fee)
    } else if fee < 0 {
        let pot = gateway.balance_of(&state.config.claim_token, &state.config.reserve_account);
        let reward = fee.unsigned_abs().min(pot);
        if reward > 0 {
            gateway.push(
                &state.config.claim_token,
                &state.config.reserve_account,
                payer,
                reward,
            )?;
        }
        Ok(-(reward as i64))
    } else {
        Ok(0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use everbond_common::constants::fixed_point::{PRICE_ONE, YIELD_ONE};
    use everbond_common::testing::{
        balance, credit, shared_balances, FlatFees, FlatPricing, MockGateway, MockIssuer,
        SharedBalances,
    };
    use everbond_common::types::Tranche;

    const NOW: u64 = 100_000;
    const MIN_WINDOW: u64 = 600;
    const MAX_WINDOW: u64 = 10_000;

    const CLAIM: TokenId = [200u8; 32];
    const RESERVE_ACCT: Address = [90u8; 32];
    const USER: Address = [3u8; 32];

    fn tid(n: u8) -> TokenId {
        [n; 32]
    }

    fn config() -> PerpConfig {
        PerpConfig {
            claim_token: CLAIM,
            reserve_account: RESERVE_ACCT,
            min_maturity_sec: MIN_WINDOW,
            max_maturity_sec: MAX_WINDOW,
            dust_floor: 0,
        }
    }

    /// 20/80 two-tranche bond; tranche tokens derived from the id
    fn split_bond(id: u8, maturity_sec: u64) -> BondBatch {
        BondBatch::new(
            [id; 32],
            tid(1),
            maturity_sec,
            vec![
                Tranche { token: [id + 100; 32], ratio: 200 },
                Tranche { token: [id + 150; 32], ratio: 800 },
            ],
        )
    }

    /// Single-tranche bond (ratio 1000)
    fn mono_bond(id: u8, maturity_sec: u64) -> BondBatch {
        BondBatch::new(
            [id; 32],
            tid(1),
            maturity_sec,
            vec![Tranche { token: [id + 100; 32], ratio: 1_000 }],
        )
    }

    fn setup() -> (PerpState, MockIssuer, MockGateway, FlatFees, FlatPricing, SharedBalances) {
        let book = shared_balances();
        let issuer = MockIssuer::new(book.clone());
        let gateway = MockGateway { book: book.clone() };
        (
            PerpState::new(config()),
            issuer,
            gateway,
            FlatFees::zero(),
            FlatPricing::par(),
            book,
        )
    }

    fn full_yields(state: &mut PerpState, bond: &BondBatch) {
        let factors = vec![YIELD_ONE; bond.tranche_count()];
        set_class_yields(state, bond.class_key(), factors, NOW).unwrap();
    }

    #[test]
    fn test_minting_bond_admission_is_idempotent() {
        let (mut state, mut issuer, _gateway, _fees, _pricing, _book) = setup();
        let bond = mono_bond(1, NOW + 5_000);
        issuer.issue(bond.clone());

        let minting = get_minting_bond(&mut state, &issuer, NOW).unwrap();
        assert_eq!(minting.id, bond.id);
        assert_eq!(state.queue.len(), 1);

        // Second call does not re-enqueue
        get_minting_bond(&mut state, &issuer, NOW).unwrap();
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn test_minting_bond_rejects_unrecognized_issue() {
        struct RogueIssuer {
            bond: BondBatch,
        }
        impl BondIssuer for RogueIssuer {
            fn latest_bond(&self) -> Option<BondBatch> {
                Some(self.bond.clone())
            }
            fn is_instance(&self, _bond: &BondBatch) -> bool {
                false
            }
            fn tranche(
                &mut self,
                _bond: &BondBatch,
                _depositor: &Address,
                _collateral_amt: u64,
            ) -> EverbondResult<Vec<u64>> {
                unreachable!()
            }
            fn redeem_mature(
                &mut self,
                _bond: &everbond_common::types::BondId,
                _token: &TokenId,
                _holder: &Address,
                _amount: u64,
            ) -> EverbondResult<u64> {
                unreachable!()
            }
        }

        let mut state = PerpState::new(config());
        let issuer = RogueIssuer { bond: mono_bond(1, NOW + 5_000) };
        assert!(matches!(
            get_minting_bond(&mut state, &issuer, NOW),
            Err(EverbondError::UnacceptableBond { .. })
        ));
    }

    #[test]
    fn test_minting_bond_requires_admissible_tail() {
        let (mut state, mut issuer, _gateway, _fees, _pricing, _book) = setup();
        // Matures past the window: never enqueued, queue stays empty
        issuer.issue(mono_bond(1, NOW + MAX_WINDOW + 1));

        assert!(matches!(
            get_minting_bond(&mut state, &issuer, NOW),
            Err(EverbondError::UnacceptableBond { .. })
        ));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_burning_bond_evicts_stale_heads() {
        let (mut state, mut issuer, _gateway, _fees, _pricing, _book) = setup();
        issuer.issue(mono_bond(1, NOW + 2_000));
        get_minting_bond(&mut state, &issuer, NOW).unwrap();
        issuer.issue(mono_bond(2, NOW + 5_000));
        get_minting_bond(&mut state, &issuer, NOW).unwrap();

        // Both still admissible
        assert_eq!(get_burning_bond(&mut state, NOW).unwrap().id, [1u8; 32]);

        // First bond drops inside the min-maturity buffer
        let later = NOW + 2_000 - MIN_WINDOW + 1;
        assert_eq!(get_burning_bond(&mut state, later).unwrap().id, [2u8; 32]);
        assert_eq!(state.retired.len(), 1);
        assert_eq!(state.retired[0].id, [1u8; 32]);
    }

    #[test]
    fn test_deposit_mints_at_par() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book) = setup();
        let bond = mono_bond(1, NOW + 5_000);
        issuer.issue(bond.clone());
        full_yields(&mut state, &bond);

        let tranche = bond.tranches[0].token;
        credit(&book, &tranche, &USER, 200);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result = deposit(&mut state, &mut collab, &USER, tranche, 200, NOW).unwrap();

        // 100% yield at par price: 200 tranche units mint 200 claims
        assert_eq!(result.claim_minted, 200);
        assert_eq!(result.fee, 0);
        assert_eq!(state.supply.total_supply, 200);
        assert_eq!(state.reserve.balance_of(&tranche), 200);
        assert_eq!(balance(&book, &CLAIM, &USER), 200);
        assert_eq!(balance(&book, &tranche, &USER), 0);
        assert!(state.yields.is_frozen(&bond.class_key()));
    }

    #[test]
    fn test_deposit_rejects_foreign_and_zero_yield_tranches() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book) = setup();
        let bond = split_bond(1, NOW + 5_000);
        issuer.issue(bond.clone());
        // Senior convertible, junior carries zero yield
        set_class_yields(&mut state, bond.class_key(), vec![YIELD_ONE, 0], NOW).unwrap();

        let junior = bond.tranches[1].token;
        credit(&book, &junior, &USER, 100);
        credit(&book, &tid(77), &USER, 100);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };

        assert!(matches!(
            deposit(&mut state, &mut collab, &USER, tid(77), 100, NOW),
            Err(EverbondError::UnacceptableDeposit { .. })
        ));
        assert!(matches!(
            deposit(&mut state, &mut collab, &USER, junior, 100, NOW),
            Err(EverbondError::UnacceptableDeposit { .. })
        ));
        // Zero amount is a no-op, not an error
        let senior = bond.tranches[0].token;
        let result = deposit(&mut state, &mut collab, &USER, senior, 0, NOW).unwrap();
        assert_eq!(result.claim_minted, 0);
    }

    #[test]
    fn test_deposit_collects_positive_mint_fee() {
        let (mut state, mut issuer, mut gateway, mut fees, pricing, book) = setup();
        fees.mint = 25_000; // 2.5% at 6 decimals
        let bond = mono_bond(1, NOW + 5_000);
        issuer.issue(bond.clone());
        full_yields(&mut state, &bond);

        let tranche = bond.tranches[0].token;
        credit(&book, &tranche, &USER, 1_000);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result = deposit(&mut state, &mut collab, &USER, tranche, 1_000, NOW).unwrap();

        assert_eq!(result.claim_minted, 1_000);
        assert_eq!(result.fee, 25);
        // Fee lands in the engine's own claim balance
        assert_eq!(balance(&book, &CLAIM, &RESERVE_ACCT), 25);
        assert_eq!(balance(&book, &CLAIM, &USER), 975);
        // Supply counts the full mint; the fee just changed hands
        assert_eq!(state.supply.total_supply, 1_000);
    }

    #[test]
    fn test_negative_fee_capped_by_fee_pot() {
        let (mut state, mut issuer, mut gateway, mut fees, pricing, book) = setup();
        fees.mint = -25_000; // 2.5% reward
        let bond = mono_bond(1, NOW + 5_000);
        issuer.issue(bond.clone());
        full_yields(&mut state, &bond);

        let tranche = bond.tranches[0].token;
        credit(&book, &tranche, &USER, 1_000);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        // Empty fee pot: reward settles to zero
        let result = deposit(&mut state, &mut collab, &USER, tranche, 1_000, NOW).unwrap();
        assert_eq!(result.fee, 0);
        assert_eq!(balance(&book, &CLAIM, &USER), 1_000);
    }

    /// Walks a queue of four single-tranche bonds, 1200s apart, 200 units
    /// of reserve each
    fn four_bond_reserve() -> (PerpState, MockIssuer, MockGateway, FlatFees, FlatPricing, SharedBalances, Vec<TokenId>)
    {
        let (mut state, mut issuer, mut gateway, fees, pricing, book) = setup();
        // Every mono bond shares one class; set its yields once
        full_yields(&mut state, &mono_bond(1, NOW + 2_000));
        let mut tranches = Vec::new();
        for i in 0..4u8 {
            let bond = mono_bond(i + 1, NOW + 2_000 + 1_200 * i as u64);
            issuer.issue(bond.clone());
            let tranche = bond.tranches[0].token;
            credit(&book, &tranche, &USER, 200);

            let mut collab = Collaborators {
                issuer: &mut issuer,
                fees: &fees,
                pricing: &pricing,
                gateway: &mut gateway,
            };
            let minted = deposit(&mut state, &mut collab, &USER, tranche, 200, NOW)
                .unwrap()
                .claim_minted;
            assert_eq!(minted, 200);
            tranches.push(tranche);
        }
        (state, issuer, gateway, fees, pricing, book, tranches)
    }

    #[test]
    fn test_redeem_within_head_bond() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book, tranches) =
            four_bond_reserve();

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result = redeem(&mut state, &mut collab, &USER, 50, NOW).unwrap();

        assert_eq!(result.claim_burned, 50);
        assert_eq!(result.remainder, 0);
        assert_eq!(result.payouts.len(), 1);
        assert_eq!(result.payouts[0].token, tranches[0]);
        assert_eq!(result.payouts[0].amount, 50);
        assert_eq!(state.reserve.balance_of(&tranches[0]), 150);
        assert_eq!(state.supply.total_supply, 750);
        assert_eq!(balance(&book, &CLAIM, &USER), 750);
    }

    #[test]
    fn test_redeem_walks_queue_head_first() {
        let (mut state, mut issuer, mut gateway, fees, pricing, _book, tranches) =
            four_bond_reserve();

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result = redeem(&mut state, &mut collab, &USER, 650, NOW).unwrap();

        // Nearest-maturity tranches drain first, in queue order
        assert_eq!(result.remainder, 0);
        assert_eq!(result.claim_burned, 650);
        let amounts: Vec<u64> = result.payouts.iter().map(|p| p.amount).collect();
        let tokens: Vec<TokenId> = result.payouts.iter().map(|p| p.token).collect();
        assert_eq!(amounts, vec![200, 200, 200, 50]);
        assert_eq!(tokens, tranches[..4].to_vec());

        // Drained bonds left the queue; the partially-drained head remains
        assert_eq!(state.queue.len(), 1);
        assert_eq!(state.reserve.balance_of(&tranches[3]), 150);
        // Fully redeemed bonds are forgotten entirely
        assert!(state.retired.is_empty());
    }

    #[test]
    fn test_redeem_conservation() {
        let (mut state, mut issuer, mut gateway, fees, pricing, _book, _tranches) =
            four_bond_reserve();

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let requested = 333;
        let result = redeem(&mut state, &mut collab, &USER, requested, NOW).unwrap();

        // Payouts convert back (uniform par terms) to exactly the burned amount
        let total_value: u64 = result
            .payouts
            .iter()
            .map(|p| tranches_to_claim(p.amount, YIELD_ONE, PRICE_ONE).unwrap())
            .sum();
        assert_eq!(total_value, requested - result.remainder);
        assert_eq!(result.claim_burned, requested - result.remainder);
        assert!(result.remainder <= requested);
    }

    #[test]
    fn test_redeem_beyond_reserve_leaves_remainder() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book, _tranches) =
            four_bond_reserve();
        // Give the caller claims beyond what the reserve backs
        credit(&book, &CLAIM, &USER, 100);
        state.supply.mint(100).unwrap();

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result = redeem(&mut state, &mut collab, &USER, 900, NOW).unwrap();

        assert_eq!(result.claim_burned, 800);
        assert_eq!(result.remainder, 100);
        assert!(state.queue.is_empty());
        assert_eq!(balance(&book, &CLAIM, &USER), 100);
    }

    #[test]
    fn test_redeem_icebox_requires_empty_queue() {
        let (mut state, mut issuer, mut gateway, fees, pricing, _book, tranches) =
            four_bond_reserve();

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        assert!(matches!(
            redeem_icebox(&mut state, &mut collab, &USER, tranches[0], 50, NOW),
            Err(EverbondError::UnacceptableRedemption { .. })
        ));
    }

    #[test]
    fn test_redeem_icebox_after_full_eviction() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book, tranches) =
            four_bond_reserve();

        // Far enough out that every bond left the window
        let later = NOW + 50_000;
        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result =
            redeem_icebox(&mut state, &mut collab, &USER, tranches[1], 80, later).unwrap();

        assert_eq!(result.claim_burned, 80);
        assert_eq!(result.remainder, 0);
        assert_eq!(result.payouts[0].amount, 80);
        assert_eq!(state.reserve.balance_of(&tranches[1]), 120);
        assert_eq!(balance(&book, &tranches[1], &USER), 80);

        // Unknown token is not a retired holding
        assert!(matches!(
            redeem_icebox(&mut state, &mut collab, &USER, tid(240), 10, later),
            Err(EverbondError::UnexpectedAsset { .. })
        ));
    }

    #[test]
    fn test_rollover_exchanges_for_retired_holdings() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book, tranches) =
            four_bond_reserve();

        // First bond falls out of the window and retires with its reserve
        let later = NOW + 2_000 - MIN_WINDOW + 1;
        // A fresh minting bond appears (same class, yields already frozen)
        let fresh = mono_bond(9, later + 9_000);
        issuer.issue(fresh.clone());
        let fresh_tranche = fresh.tranches[0].token;
        credit(&book, &fresh_tranche, &USER, 500);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        let result = rollover(
            &mut state,
            &mut collab,
            &USER,
            fresh_tranche,
            tranches[0],
            50,
            later,
        )
        .unwrap();

        assert_eq!(result.tranche_in_used, 50);
        assert_eq!(result.token_out_amt, 50);
        assert_eq!(state.reserve.balance_of(&fresh_tranche), 50);
        assert_eq!(state.reserve.balance_of(&tranches[0]), 150);
        assert_eq!(balance(&book, &tranches[0], &USER), 50);
        // Supply is untouched by rollovers
        assert_eq!(state.supply.total_supply, 800);
    }

    #[test]
    fn test_rollover_partial_fill_caps_at_holding() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book, tranches) =
            four_bond_reserve();

        let later = NOW + 2_000 - MIN_WINDOW + 1;
        let fresh = mono_bond(9, later + 9_000);
        issuer.issue(fresh.clone());
        let fresh_tranche = fresh.tranches[0].token;
        credit(&book, &fresh_tranche, &USER, 500);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        // Asks for 500 out but the reserve only holds 200 of the target
        let result = rollover(
            &mut state,
            &mut collab,
            &USER,
            fresh_tranche,
            tranches[0],
            500,
            later,
        )
        .unwrap();

        assert_eq!(result.token_out_amt, 200);
        assert_eq!(result.tranche_in_used, 200);
        assert_eq!(balance(&book, &fresh_tranche, &USER), 300);
        // Target fully drained; its bond is forgotten
        assert_eq!(state.reserve.balance_of(&tranches[0]), 0);
        assert!(!state.retired.iter().any(|b| b.id == [1u8; 32]));
    }

    #[test]
    fn test_rollover_rejects_queued_target() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book, tranches) =
            four_bond_reserve();

        let fresh = mono_bond(9, NOW + 9_999);
        issuer.issue(fresh.clone());
        let fresh_tranche = fresh.tranches[0].token;
        credit(&book, &fresh_tranche, &USER, 100);

        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        // tranches[1] still sits in the queue
        assert!(matches!(
            rollover(&mut state, &mut collab, &USER, fresh_tranche, tranches[1], 50, NOW),
            Err(EverbondError::UnacceptableRollover { .. })
        ));
        // And the in-leg must come from the minting bond
        assert!(matches!(
            rollover(&mut state, &mut collab, &USER, tranches[1], tranches[0], 50, NOW),
            Err(EverbondError::UnacceptableRollover { .. })
        ));
    }

    #[test]
    fn test_yields_freeze_after_first_mint() {
        let (mut state, mut issuer, mut gateway, fees, pricing, book) = setup();
        let bond = mono_bond(1, NOW + 5_000);
        issuer.issue(bond.clone());
        full_yields(&mut state, &bond);

        let tranche = bond.tranches[0].token;
        credit(&book, &tranche, &USER, 10);
        let mut collab = Collaborators {
            issuer: &mut issuer,
            fees: &fees,
            pricing: &pricing,
            gateway: &mut gateway,
        };
        deposit(&mut state, &mut collab, &USER, tranche, 10, NOW).unwrap();

        assert!(matches!(
            set_class_yields(&mut state, bond.class_key(), vec![500_000], NOW),
            Err(EverbondError::YieldFrozen { .. })
        ));
    }

    #[test]
    fn test_queue_stays_sorted_under_advancement() {
        let (mut state, mut issuer, _gateway, _fees, _pricing, _book) = setup();

        let mut now = NOW;
        for i in 0..6u8 {
            issuer.issue(mono_bond(i + 1, now + 5_000));
            get_minting_bond(&mut state, &issuer, now).unwrap();
            let _ = get_burning_bond(&mut state, now);

            let maturities: Vec<u64> = state.queue.iter().map(|b| b.maturity_sec).collect();
            let mut sorted = maturities.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(maturities, sorted, "queue must stay strictly sorted");

            now += 1_500;
        }
    }
}
