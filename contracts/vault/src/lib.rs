//! Rollover Vault
//!
//! Automates the claim token's collateral lifecycle: converts raw
//! collateral into bond tranches, exchanges maturing reserve tranches for
//! fresher ones through the claim engine's rollover market, and prices
//! proportional ownership shares against the vault's multi-asset reserve.
//!
//! ## Core Operations
//!
//! - **vault_deposit / vault_redeem**: NAV-priced share issuance and
//!   pro-rata redemption
//! - **deploy**: Tranche usable collateral through the minting bond and
//!   roll the most-junior minted tranche into maturing reserve assets
//! - **recover / recover_asset**: Redeem matured deployed tranches back to
//!   underlying collateral
//! - **recover_and_redeploy**: Both, as one atomic unit
//! - **swap_underlying_for_perps / swap_perps_for_underlying**: Wrap the
//!   tranche-then-deposit pipeline into a single-token swap surface
//!
//! ## Phase machine
//!
//! `Idle -> Deploying -> Idle` and `Idle -> Recovering -> Idle` within one
//! call; a non-idle phase at entry is rejected, so a collaborator can
//! never observe - or re-enter - a half-applied automaton step.

use borsh::{BorshDeserialize, BorshSerialize};
use everbond_common::collaborators::{Collaborators, PricingSource, TokenGateway};
use everbond_common::constants::deployment;
use everbond_common::constants::fixed_point::PRICE_ONE;
use everbond_common::constants::reserve as reserve_config;
use everbond_common::constants::share;
use everbond_common::conversion::tranches_to_claim;
use everbond_common::errors::{EverbondError, EverbondResult};
use everbond_common::events::{EventLog, EverbondEvent};
use everbond_common::math::{mul_div_floor, safe_add, signed_perc_of, to_amount};
use everbond_common::reserve::{ReserveLedger, SyncOutcome};
use everbond_common::types::{Address, BondBatch, BondId, ClassKey, TokenId, TokenSupply};
use everbond_common::Vec;
use everbond_perp::{self as perp, PerpState, RedemptionLeg};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Static configuration for a vault instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultConfig {
    /// Raw collateral token the vault accepts and deploys
    pub underlying: TokenId,
    /// Ownership share token
    pub share_token: TokenId,
    /// Account holding the vault reserve
    pub vault_account: Address,
    /// Minimum usable collateral for a deploy
    pub min_deployment: u64,
    /// Underlying balance kept undeployed as redemption liquidity
    pub reserved_balance: u64,
    /// Ceiling on tracked reserve assets
    pub max_deployed_assets: usize,
    /// Reserve dust floor
    pub dust_floor: u64,
}

impl VaultConfig {
    /// Configuration with protocol-default deployment parameters
    pub fn new(underlying: TokenId, share_token: TokenId, vault_account: Address) -> Self {
        Self {
            underlying,
            share_token,
            vault_account,
            min_deployment: deployment::MIN_DEPLOYMENT,
            reserved_balance: deployment::DEFAULT_RESERVED_BALANCE,
            max_deployed_assets: deployment::MAX_DEPLOYED_ASSETS,
            dust_floor: reserve_config::DUST_FLOOR,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Automaton phase; transitions stay inside a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultPhase {
    /// Between operations
    Idle,
    /// Converting collateral into tranches and rolling them forward
    Deploying,
    /// Redeeming matured deployed tranches
    Recovering,
}

/// Bookkeeping for a tranche the vault holds or has held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DeployedTranche {
    /// Tranche token
    pub token: TokenId,
    /// Parent bond
    pub bond: BondId,
    /// Parent bond class
    pub class: ClassKey,
    /// Seniority index within the parent bond
    pub seniority: u8,
    /// Parent bond maturity
    pub maturity_sec: u64,
}

/// Mutable state of a vault instance
#[derive(Debug, Clone)]
pub struct VaultState {
    /// Static configuration
    pub config: VaultConfig,
    /// Asset balances backing the outstanding shares
    pub reserve: ReserveLedger,
    /// Metadata for tranches the vault has taken on
    pub deployed: Vec<DeployedTranche>,
    /// Outstanding share supply
    pub supply: TokenSupply,
    /// Automaton phase
    pub phase: VaultPhase,
    /// Event log for this instance
    pub events: EventLog,
}

impl VaultState {
    /// Create a fresh vault from a fully-formed configuration
    pub fn new(config: VaultConfig) -> Self {
        let reserve = ReserveLedger::new(config.dust_floor);
        Self {
            config,
            reserve,
            deployed: Vec::new(),
            supply: TokenSupply::shares(),
            phase: VaultPhase::Idle,
            events: EventLog::new(),
        }
    }

    /// Metadata for a deployed tranche token
    pub fn deployed_meta(&self, token: &TokenId) -> Option<&DeployedTranche> {
        self.deployed.iter().find(|d| &d.token == token)
    }

    fn register_deployed(&mut self, bond: &BondBatch, seniority: usize) {
        let token = bond.tranches[seniority].token;
        if self.deployed.iter().any(|d| d.token == token) {
            return;
        }
        self.deployed.push(DeployedTranche {
            token,
            bond: bond.id,
            class: bond.class_key(),
            seniority: seniority as u8,
            maturity_sec: bond.maturity_sec,
        });
    }

    /// Total reserve value in underlying units: raw collateral at 1:1,
    /// tranches via their yield-equivalent collateral backing at market
    /// price. Assets without a known yield carry no NAV weight.
    pub fn total_asset_value(
        &self,
        perp_state: &PerpState,
        pricing: &dyn PricingSource,
    ) -> EverbondResult<u64> {
        self.reserve.aggregate_value(|token, bal| {
            if token == &self.config.underlying {
                return Ok(bal);
            }
            let located = match self.deployed_meta(token) {
                Some(meta) => Some((meta.class, meta.seniority as usize)),
                None => perp_state
                    .find_bond_of(token)
                    .map(|(bond, seniority)| (bond.class_key(), seniority)),
            };
            let Some((class, seniority)) = located else {
                return Ok(0);
            };
            let yield_factor = perp_state.yields.factor(&class, seniority);
            if yield_factor == 0 {
                return Ok(0);
            }
            tranches_to_claim(bal, yield_factor, pricing.tranche_price(token))
        })
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a share issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultDepositResult {
    /// Shares minted to the caller, net of the vault mint fee
    pub shares_minted: u64,
    /// Signed fee settled in shares
    pub fee: i64,
}

/// Outcome of a share redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRedeemResult {
    /// Shares burned
    pub shares_burned: u64,
    /// Signed fee settled in shares
    pub fee: i64,
    /// Pro-rata payouts in reserve insertion order
    pub payouts: Vec<RedemptionLeg>,
}

/// Outcome of a deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployResult {
    /// Collateral tranched through the minting bond
    pub deployed: u64,
    /// Junior tranche units exchanged through the rollover market
    pub rolled: u64,
}

/// Outcome of a recovery sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverResult {
    /// Collateral recovered per matured tranche
    pub recovered: Vec<RedemptionLeg>,
}

/// Outcome of an underlying -> claims swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapMintResult {
    /// Claims forwarded to the caller
    pub claims_out: u64,
}

/// Outcome of a claims -> underlying swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapBurnResult {
    /// Claims the reserve could actually absorb
    pub claims_used: u64,
    /// Underlying paid to the caller
    pub underlying_out: u64,
    /// Signed fee settled in underlying
    pub fee: i64,
}

// ============================================================================
// NAV Engine
// ============================================================================

/// Shares owed for an underlying deposit, priced against the current
/// reserve value. A zero-supply vault seeds at a fixed ratio.
pub fn compute_mint_amt(
    vault: &VaultState,
    perp_state: &PerpState,
    pricing: &dyn PricingSource,
    underlying_amt: u64,
) -> EverbondResult<u64> {
    if vault.supply.total_supply == 0 {
        return to_amount(underlying_amt as u128 * share::INITIAL_SHARES_PER_UNIT as u128);
    }
    let total_value = vault.total_asset_value(perp_state, pricing)?;
    to_amount(mul_div_floor(
        underlying_amt as u128,
        vault.supply.total_supply as u128,
        total_value as u128,
    )?)
}

/// Pro-rata payout per tracked asset for a share redemption, in reserve
/// insertion order. A direct slice of the reserve - no queue walk, no
/// remainder.
pub fn compute_redemption_amts(
    vault: &VaultState,
    share_amt: u64,
) -> EverbondResult<Vec<RedemptionLeg>> {
    let total = vault.supply.total_supply;
    if share_amt > total {
        return Err(EverbondError::InsufficientBalance {
            token: vault.config.share_token,
            available: total,
            requested: share_amt,
        });
    }
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut payouts = Vec::new();
    for entry in vault.reserve.iter() {
        let amount = to_amount(mul_div_floor(
            entry.balance as u128,
            share_amt as u128,
            total as u128,
        )?)?;
        if amount > 0 {
            payouts.push(RedemptionLeg { token: entry.token, amount });
        }
    }
    Ok(payouts)
}

/// Deposit underlying, minting shares at the pre-deposit NAV, net of the
/// signed vault mint fee.
pub fn vault_deposit(
    vault: &mut VaultState,
    perp_state: &PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    amount: u64,
    now_sec: u64,
) -> EverbondResult<VaultDepositResult> {
    if amount == 0 {
        return Ok(VaultDepositResult { shares_minted: 0, fee: 0 });
    }

    let shares = compute_mint_amt(vault, perp_state, collab.pricing, amount)?;
    if shares == 0 {
        return Ok(VaultDepositResult { shares_minted: 0, fee: 0 });
    }
    let fee = signed_perc_of(shares, collab.fees.vault_mint_fee_perc(), collab.fees.decimals())?;
    let net = if fee >= 0 {
        shares.saturating_sub(fee as u64)
    } else {
        safe_add(shares, fee.unsigned_abs())?
    };
    if net == 0 {
        return Ok(VaultDepositResult { shares_minted: 0, fee: 0 });
    }

    collab
        .gateway
        .pull(&vault.config.underlying, caller, &vault.config.vault_account, amount)?;
    let underlying = vault.config.underlying;
    sync_vault_asset(vault, &*collab.gateway, &underlying, now_sec)?;

    vault.supply.mint(net)?;
    collab
        .gateway
        .mint(&vault.config.share_token, caller, net)?;

    vault.events.emit(EverbondEvent::SharesMinted {
        caller: *caller,
        underlying_amt: amount,
        shares: net,
        fee,
        now_sec,
    });

    Ok(VaultDepositResult { shares_minted: net, fee })
}

/// Redeem shares for a pro-rata slice of every tracked asset, net of the
/// signed vault burn fee.
pub fn vault_redeem(
    vault: &mut VaultState,
    collab: &mut Collaborators,
    caller: &Address,
    share_amt: u64,
    now_sec: u64,
) -> EverbondResult<VaultRedeemResult> {
    if share_amt == 0 {
        return Ok(VaultRedeemResult {
            shares_burned: 0,
            fee: 0,
            payouts: Vec::new(),
        });
    }

    let fee = signed_perc_of(share_amt, collab.fees.vault_burn_fee_perc(), collab.fees.decimals())?;
    let net = if fee >= 0 {
        share_amt.saturating_sub(fee as u64)
    } else {
        safe_add(share_amt, fee.unsigned_abs())?
    };

    let payouts = compute_redemption_amts(vault, net)?;
    for leg in &payouts {
        collab
            .gateway
            .push(&leg.token, &vault.config.vault_account, caller, leg.amount)?;
        sync_vault_asset(vault, &*collab.gateway, &leg.token, now_sec)?;
    }

    collab
        .gateway
        .burn(&vault.config.share_token, caller, share_amt)?;
    vault.supply.burn(share_amt)?;

    vault.events.emit(EverbondEvent::SharesBurned {
        caller: *caller,
        shares: share_amt,
        fee,
        now_sec,
    });

    Ok(VaultRedeemResult {
        shares_burned: share_amt,
        fee,
        payouts,
    })
}

// ============================================================================
// Rollover Automaton
// ============================================================================

/// Convert usable collateral into tranches of the minting bond and roll
/// the most-junior minted tranche into maturing reserve assets.
///
/// Usable collateral is the underlying balance above the reserved floor;
/// below the configured minimum the deploy fails with
/// `InsufficientDeployment`. `DeployedCountOverLimit` if the resulting
/// tracked-asset count would pass the ceiling.
pub fn deploy(
    vault: &mut VaultState,
    perp_state: &mut PerpState,
    collab: &mut Collaborators,
    now_sec: u64,
) -> EverbondResult<DeployResult> {
    if vault.phase != VaultPhase::Idle {
        return Err(EverbondError::InvalidStateTransition);
    }

    let underlying = vault.config.underlying;
    let held = collab
        .gateway
        .balance_of(&underlying, &vault.config.vault_account);
    let usable = held.saturating_sub(vault.config.reserved_balance);
    if usable < vault.config.min_deployment {
        return Err(EverbondError::InsufficientDeployment {
            usable,
            minimum: vault.config.min_deployment,
        });
    }

    let minting = perp::get_minting_bond(perp_state, &*collab.issuer, now_sec)?;
    // Retire anything that fell out of the window so rollover targets are
    // judged against the current queue
    let _ = perp::get_burning_bond(perp_state, now_sec);

    let fresh_assets = minting
        .tranches
        .iter()
        .filter(|t| !vault.reserve.contains(&t.token))
        .count();
    if vault.reserve.len() + fresh_assets > vault.config.max_deployed_assets {
        return Err(EverbondError::DeployedCountOverLimit {
            count: vault.reserve.len() + fresh_assets,
            limit: vault.config.max_deployed_assets,
        });
    }

    vault.phase = VaultPhase::Deploying;

    let amounts = collab
        .issuer
        .tranche(&minting, &vault.config.vault_account, usable)?;
    for seniority in 0..minting.tranche_count() {
        if amounts.get(seniority).copied().unwrap_or(0) > 0 {
            vault.register_deployed(&minting, seniority);
        }
    }

    // Roll the junior leg across maturity-ordered targets until the input
    // runs out or no targets remain; skipped entirely for a zero-yield
    // junior, which is non-convertible by definition
    let mut rolled = 0u64;
    let junior_seniority = minting.tranche_count() - 1;
    let junior_token = minting.tranches[junior_seniority].token;
    let junior_yield = perp_state
        .yields
        .factor(&minting.class_key(), junior_seniority);
    if junior_yield > 0 {
        let mut remaining = collab
            .gateway
            .balance_of(&junior_token, &vault.config.vault_account);
        while remaining > 0 {
            let Some(target) = perp_state.rollover_targets().first().copied() else {
                break;
            };
            let target_meta = perp_state.find_bond_of(&target);
            let result = perp::rollover(
                perp_state,
                collab,
                &vault.config.vault_account,
                junior_token,
                target,
                remaining,
                now_sec,
            )?;
            if result.tranche_in_used == 0 {
                break;
            }
            remaining -= result.tranche_in_used;
            rolled += result.tranche_in_used;
            if let Some((bond, seniority)) = target_meta {
                vault.register_deployed(&bond, seniority);
            }
            sync_vault_asset(vault, &*collab.gateway, &target, now_sec)?;
        }
    }

    for tranche in &minting.tranches {
        let token = tranche.token;
        sync_vault_asset(vault, &*collab.gateway, &token, now_sec)?;
    }
    sync_vault_asset(vault, &*collab.gateway, &underlying, now_sec)?;

    if vault.reserve.len() > vault.config.max_deployed_assets {
        return Err(EverbondError::DeployedCountOverLimit {
            count: vault.reserve.len(),
            limit: vault.config.max_deployed_assets,
        });
    }

    vault.events.emit(EverbondEvent::CollateralDeployed {
        amount: usable,
        now_sec,
    });
    vault.phase = VaultPhase::Idle;

    Ok(DeployResult { deployed: usable, rolled })
}

/// Redeem every deployed tranche whose parent bond has matured back into
/// underlying collateral.
pub fn recover(
    vault: &mut VaultState,
    collab: &mut Collaborators,
    now_sec: u64,
) -> EverbondResult<RecoverResult> {
    if vault.phase != VaultPhase::Idle {
        return Err(EverbondError::InvalidStateTransition);
    }
    vault.phase = VaultPhase::Recovering;

    let matured: Vec<DeployedTranche> = vault
        .deployed
        .iter()
        .filter(|d| d.maturity_sec <= now_sec)
        .cloned()
        .collect();

    let mut recovered = Vec::new();
    for meta in matured {
        recover_tranche(vault, collab, &meta, &mut recovered, now_sec)?;
    }

    let underlying = vault.config.underlying;
    sync_vault_asset(vault, &*collab.gateway, &underlying, now_sec)?;
    vault.phase = VaultPhase::Idle;

    Ok(RecoverResult { recovered })
}

/// Single-asset recovery; `UnexpectedAsset` when the token is not a
/// recognized deployed tranche. A not-yet-matured tranche is left alone.
pub fn recover_asset(
    vault: &mut VaultState,
    collab: &mut Collaborators,
    token: TokenId,
    now_sec: u64,
) -> EverbondResult<RecoverResult> {
    if vault.phase != VaultPhase::Idle {
        return Err(EverbondError::InvalidStateTransition);
    }
    let meta = vault
        .deployed_meta(&token)
        .cloned()
        .ok_or(EverbondError::UnexpectedAsset { token })?;

    vault.phase = VaultPhase::Recovering;

    let mut recovered = Vec::new();
    if meta.maturity_sec <= now_sec {
        recover_tranche(vault, collab, &meta, &mut recovered, now_sec)?;
        let underlying = vault.config.underlying;
        sync_vault_asset(vault, &*collab.gateway, &underlying, now_sec)?;
    }
    vault.phase = VaultPhase::Idle;

    Ok(RecoverResult { recovered })
}

/// Recovery followed immediately by a deploy, as one atomic unit
pub fn recover_and_redeploy(
    vault: &mut VaultState,
    perp_state: &mut PerpState,
    collab: &mut Collaborators,
    now_sec: u64,
) -> EverbondResult<(RecoverResult, DeployResult)> {
    let recovered = recover(vault, collab, now_sec)?;
    let deployed = deploy(vault, perp_state, collab, now_sec)?;
    Ok((recovered, deployed))
}

fn recover_tranche(
    vault: &mut VaultState,
    collab: &mut Collaborators,
    meta: &DeployedTranche,
    recovered: &mut Vec<RedemptionLeg>,
    now_sec: u64,
) -> EverbondResult<()> {
    let held = collab
        .gateway
        .balance_of(&meta.token, &vault.config.vault_account);
    if held > 0 {
        let out = collab.issuer.redeem_mature(
            &meta.bond,
            &meta.token,
            &vault.config.vault_account,
            held,
        )?;
        recovered.push(RedemptionLeg { token: meta.token, amount: out });
        vault.events.emit(EverbondEvent::TrancheRecovered {
            token: meta.token,
            collateral_out: out,
            now_sec,
        });
    }
    sync_vault_asset(vault, &*collab.gateway, &meta.token, now_sec)?;
    vault.deployed.retain(|d| d.token != meta.token);
    Ok(())
}

// ============================================================================
// Swap Surface
// ============================================================================

/// Swap underlying for freshly minted claims: tranche the collateral
/// through the minting bond, deposit every convertible leg into the claim
/// engine, and forward the minted claims. Unconvertible (zero-yield) legs
/// stay in the vault reserve; no claim balance is left behind.
pub fn swap_underlying_for_perps(
    vault: &mut VaultState,
    perp_state: &mut PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    amount: u64,
    now_sec: u64,
) -> EverbondResult<SwapMintResult> {
    if amount == 0 {
        return Ok(SwapMintResult { claims_out: 0 });
    }

    let minting = perp::get_minting_bond(perp_state, &*collab.issuer, now_sec)?;
    let class = minting.class_key();
    let claim_token = perp_state.config.claim_token;

    collab
        .gateway
        .pull(&vault.config.underlying, caller, &vault.config.vault_account, amount)?;
    let amounts = collab
        .issuer
        .tranche(&minting, &vault.config.vault_account, amount)?;

    let claims_before = collab
        .gateway
        .balance_of(&claim_token, &vault.config.vault_account);

    for (seniority, tranche) in minting.tranches.iter().enumerate() {
        let leg_amount = amounts.get(seniority).copied().unwrap_or(0);
        if leg_amount == 0 {
            continue;
        }
        if perp_state.yields.factor(&class, seniority) == 0 {
            vault.register_deployed(&minting, seniority);
            continue;
        }
        perp::deposit(
            perp_state,
            collab,
            &vault.config.vault_account,
            tranche.token,
            leg_amount,
            now_sec,
        )?;
    }

    let claims_after = collab
        .gateway
        .balance_of(&claim_token, &vault.config.vault_account);
    let claims_out = claims_after.saturating_sub(claims_before);
    if claims_out > 0 {
        collab
            .gateway
            .push(&claim_token, &vault.config.vault_account, caller, claims_out)?;
    }

    for tranche in &minting.tranches {
        let token = tranche.token;
        sync_vault_asset(vault, &*collab.gateway, &token, now_sec)?;
    }
    let underlying = vault.config.underlying;
    sync_vault_asset(vault, &*collab.gateway, &underlying, now_sec)?;

    if vault.reserve.len() > vault.config.max_deployed_assets {
        return Err(EverbondError::DeployedCountOverLimit {
            count: vault.reserve.len(),
            limit: vault.config.max_deployed_assets,
        });
    }

    vault.events.emit(EverbondEvent::SwappedUnderlyingForClaims {
        caller: *caller,
        underlying_in: amount,
        claims_out,
        now_sec,
    });

    Ok(SwapMintResult { claims_out })
}

/// Swap claims for underlying liquidity at the claim price, net of the
/// vault burn fee. The received claims are redeemed against the claim
/// engine in the same call; what the reserve cannot absorb is returned to
/// the caller. `LiquidityOutOfBounds` if the payout would push the
/// underlying balance below the reserved floor.
pub fn swap_perps_for_underlying(
    vault: &mut VaultState,
    perp_state: &mut PerpState,
    collab: &mut Collaborators,
    caller: &Address,
    claim_amt: u64,
    now_sec: u64,
) -> EverbondResult<SwapBurnResult> {
    if claim_amt == 0 {
        return Ok(SwapBurnResult {
            claims_used: 0,
            underlying_out: 0,
            fee: 0,
        });
    }

    let claim_token = perp_state.config.claim_token;
    // Snapshot queued bonds: redeem may retire and forget drained ones
    // before the payout legs are registered
    let queued: Vec<BondBatch> = perp_state.queue.iter().cloned().collect();

    collab
        .gateway
        .pull(&claim_token, caller, &vault.config.vault_account, claim_amt)?;

    let redeemed = perp::redeem(
        perp_state,
        collab,
        &vault.config.vault_account,
        claim_amt,
        now_sec,
    )?;
    let realized = redeemed.claim_burned;
    if redeemed.remainder > 0 {
        collab
            .gateway
            .push(&claim_token, &vault.config.vault_account, caller, redeemed.remainder)?;
    }

    for leg in &redeemed.payouts {
        if let Some((bond, seniority)) = queued
            .iter()
            .find_map(|b| b.seniority_of(&leg.token).map(|s| (b, s)))
        {
            vault.register_deployed(bond, seniority);
        }
        sync_vault_asset(vault, &*collab.gateway, &leg.token, now_sec)?;
    }

    let gross = to_amount(mul_div_floor(
        realized as u128,
        collab.pricing.claim_price() as u128,
        PRICE_ONE as u128,
    )?)?;
    let fee = signed_perc_of(gross, collab.fees.vault_burn_fee_perc(), collab.fees.decimals())?;
    let underlying_out = if fee >= 0 {
        gross.saturating_sub(fee as u64)
    } else {
        safe_add(gross, fee.unsigned_abs())?
    };

    let underlying = vault.config.underlying;
    let held = collab
        .gateway
        .balance_of(&underlying, &vault.config.vault_account);
    if held < underlying_out
        || held - underlying_out < vault.config.reserved_balance
    {
        return Err(EverbondError::LiquidityOutOfBounds {
            balance: held,
            floor: vault.config.reserved_balance,
        });
    }

    if underlying_out > 0 {
        collab
            .gateway
            .push(&underlying, &vault.config.vault_account, caller, underlying_out)?;
    }
    sync_vault_asset(vault, &*collab.gateway, &underlying, now_sec)?;

    vault.events.emit(EverbondEvent::SwappedClaimsForUnderlying {
        caller: *caller,
        claims_in: realized,
        underlying_out,
        now_sec,
    });

    Ok(SwapBurnResult {
        claims_used: realized,
        underlying_out,
        fee,
    })
}

// ============================================================================
// Internal Helpers
// ============================================================================

/// Re-read an asset's vault balance from the gateway and reconcile the
/// ledger; called after every balance-affecting transfer
fn sync_vault_asset(
    vault: &mut VaultState,
    gateway: &dyn TokenGateway,
    token: &TokenId,
    now_sec: u64,
) -> EverbondResult<SyncOutcome> {
    let balance = gateway.balance_of(token, &vault.config.vault_account);
    let outcome = vault.reserve.sync(*token, balance)?;
    let tracked = matches!(outcome, SyncOutcome::Added | SyncOutcome::Updated);
    vault.events.emit(EverbondEvent::ReserveSynced {
        token: *token,
        balance,
        tracked,
        now_sec,
    });
    Ok(outcome)
}
