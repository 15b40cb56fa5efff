//! Exchanger: synth-to-synth exchanges with delayed settlement.
//!
//! An exchange executes immediately at the last known rates and leaves an
//! [`ExchangeEntry`] in the destination queue. Once the waiting period has
//! passed, the entry is settled by recomputing what it would have paid at the
//! rates current at settlement time. Overpayment is reclaimed (burned), and
//! underpayment is rebated (minted).
//!
//! Balances with queued entries pass through a settlement gate before they
//! can move: while any entry is still waiting, nothing moves; after that, at
//! most `balance - reclaim` moves and the settlement is applied first.

use serde::Serialize;

use synth_common::config::EngineConfig;
use synth_common::error::OrOverflow;
use synth_common::{AccountId, AssetId, Decimal, SynthError, SynthResult, Timestamp};
use synth_oracle::ExchangeRates;

use crate::balances::Balances;
use crate::exchange_state::{ExchangeEntry, ExchangeState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettlementOwing {
    pub reclaim: Decimal,
    pub rebate: Decimal,
    pub num_entries: usize,
}

/// A settlement that has been validated and can be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementPlan {
    pub account: AccountId,
    pub asset: AssetId,
    /// Entries timestamped at or before this are settled.
    pub cutoff: Timestamp,
    /// Amount to burn, already capped at the account's balance.
    pub reclaim: Decimal,
    pub rebate: Decimal,
    pub num_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeOutcome {
    pub account: AccountId,
    pub src: AssetId,
    pub amount: Decimal,
    pub dest: AssetId,
    pub amount_received: Decimal,
    /// Fee in destination units.
    pub fee: Decimal,
    /// Fee converted to the base asset, as minted to the fee address.
    pub fee_in_base: Decimal,
    pub fee_rate: Decimal,
    pub source_settlement: Option<SettlementPlan>,
    pub dest_settlement: Option<SettlementPlan>,
}

/// Everything an exchange needs besides the ledger state.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeRequest<'a> {
    pub account: &'a AccountId,
    pub src: &'a AssetId,
    pub amount: Decimal,
    pub dest: &'a AssetId,
    pub fee_rate: Decimal,
    pub base_asset: &'a AssetId,
    pub fee_address: &'a AccountId,
}

pub struct Exchanger {
    state: ExchangeState,
    waiting_period_secs: u64,
    exchange_enabled: bool,
}

impl Exchanger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: ExchangeState::new(config.max_entries_in_queue),
            waiting_period_secs: config.waiting_period_secs,
            exchange_enabled: config.exchange_enabled,
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn waiting_period_secs(&self) -> u64 {
        self.waiting_period_secs
    }

    pub fn set_waiting_period_secs(&mut self, secs: u64) {
        self.waiting_period_secs = secs;
        tracing::info!(secs, "Waiting period set");
    }

    pub fn exchange_enabled(&self) -> bool {
        self.exchange_enabled
    }

    pub fn set_exchange_enabled(&mut self, enabled: bool) {
        self.exchange_enabled = enabled;
        tracing::info!(enabled, "Exchange enabled flag set");
    }

    pub fn set_max_entries_in_queue(&mut self, max: usize) -> SynthResult<()> {
        if max == 0 {
            return Err(SynthError::Validation(
                "max entries in queue must be at least 1".to_string(),
            ));
        }
        self.state.set_max_entries_in_queue(max);
        tracing::info!(max, "Max entries in queue set");
        Ok(())
    }

    pub fn max_secs_left_in_waiting_period(&self, account: &AccountId, asset: &AssetId, now: Timestamp) -> u64 {
        if self.state.get_length_of_entries(account, asset) == 0 {
            return 0;
        }
        let elapsed = now.saturating_sub(self.state.get_max_timestamp(account, asset));
        self.waiting_period_secs.saturating_sub(elapsed)
    }

    /// Reclaim and rebate owed on every queued entry into `asset`, at current rates.
    pub fn settlement_owing(
        &self,
        account: &AccountId,
        asset: &AssetId,
        rates: &ExchangeRates,
        now: Timestamp,
    ) -> SynthResult<SettlementOwing> {
        Self::owing_for(self.state.entries(account, asset), rates, now)
    }

    fn owing_for<'a, I>(entries: I, rates: &ExchangeRates, now: Timestamp) -> SynthResult<SettlementOwing>
    where
        I: IntoIterator<Item = &'a ExchangeEntry> + Clone,
    {
        rates.ensure_fresh(
            entries.clone().into_iter().flat_map(|e| [&e.src, &e.dest]),
            now,
        )?;

        let mut owing = SettlementOwing::default();
        for entry in entries {
            let recomputed = Self::amount_after_fee(
                rates.effective_value(&entry.src, entry.amount, &entry.dest)?,
                entry.exchange_fee_rate,
            )?;
            if entry.amount_received > recomputed {
                let diff = entry.amount_received.saturating_sub(recomputed);
                owing.reclaim = owing.reclaim.checked_add(diff).or_overflow()?;
            } else {
                let diff = recomputed.saturating_sub(entry.amount_received);
                owing.rebate = owing.rebate.checked_add(diff).or_overflow()?;
            }
            owing.num_entries += 1;
        }
        Ok(owing)
    }

    fn amount_after_fee(value: Decimal, fee_rate: Decimal) -> SynthResult<Decimal> {
        value
            .checked_mul(Decimal::ONE.saturating_sub(fee_rate))
            .or_overflow()
    }

    fn settleable_cutoff(&self, now: Timestamp) -> Timestamp {
        now.saturating_sub(self.waiting_period_secs)
    }

    /// Plan settlement of entries timestamped at or before `cutoff`.
    fn plan_through<B: Balances>(
        &self,
        account: &AccountId,
        asset: &AssetId,
        cutoff: Timestamp,
        rates: &ExchangeRates,
        balances: &B,
        now: Timestamp,
    ) -> SynthResult<Option<SettlementPlan>> {
        let due = self
            .state
            .entries(account, asset)
            .iter()
            .filter(|e| e.timestamp <= cutoff);
        if due.clone().next().is_none() {
            return Ok(None);
        }
        let owing = Self::owing_for(due, rates, now)?;
        Ok(Some(SettlementPlan {
            account: account.clone(),
            asset: asset.clone(),
            cutoff,
            reclaim: owing.reclaim.min(balances.balance_of(asset, account)),
            rebate: owing.rebate,
            num_entries: owing.num_entries,
        }))
    }

    /// Plan settlement of the whole queue. Fails while any entry is still waiting.
    pub fn plan_settlement<B: Balances>(
        &self,
        account: &AccountId,
        asset: &AssetId,
        rates: &ExchangeRates,
        balances: &B,
        now: Timestamp,
    ) -> SynthResult<Option<SettlementPlan>> {
        let secs_left = self.max_secs_left_in_waiting_period(account, asset, now);
        if secs_left > 0 {
            return Err(SynthError::WaitingPeriodActive {
                asset: asset.clone(),
                secs_left,
            });
        }
        self.plan_through(account, asset, self.settleable_cutoff(now), rates, balances, now)
    }

    /// Check that `amount` of `asset` may leave `account`, returning the
    /// settlement that must be applied first, if any.
    pub fn settlement_gate<B: Balances>(
        &self,
        account: &AccountId,
        asset: &AssetId,
        amount: Decimal,
        rates: &ExchangeRates,
        balances: &B,
        now: Timestamp,
    ) -> SynthResult<Option<SettlementPlan>> {
        let plan = self.plan_settlement(account, asset, rates, balances, now)?;
        let balance = balances.balance_of(asset, account);
        if amount > balance {
            return Err(SynthError::InsufficientBalance {
                asset: asset.clone(),
                requested: amount,
                available: balance,
            });
        }
        if let Some(plan) = &plan {
            let movable = balance.saturating_sub(plan.reclaim);
            if amount > movable {
                return Err(SynthError::SettlementRequired {
                    asset: asset.clone(),
                    reclaim: plan.reclaim,
                    available: movable,
                });
            }
        }
        Ok(plan)
    }

    /// Apply a settlement from [`plan_settlement`](Self::plan_settlement) or
    /// [`settlement_gate`](Self::settlement_gate).
    pub fn apply_settlement<B: Balances>(
        &mut self,
        plan: &SettlementPlan,
        balances: &mut B,
    ) -> SynthResult<Vec<ExchangeEntry>> {
        if !plan.reclaim.is_zero() {
            balances.burn(&plan.asset, &plan.account, plan.reclaim)?;
        }
        if !plan.rebate.is_zero() {
            balances.mint(&plan.asset, &plan.account, plan.rebate)?;
        }
        let settled = self
            .state
            .remove_entries_through(&plan.account, &plan.asset, plan.cutoff);
        tracing::info!(
            account = %plan.account,
            asset = %plan.asset,
            reclaim = %plan.reclaim,
            rebate = %plan.rebate,
            entries = settled.len(),
            "Exchange entries settled"
        );
        Ok(settled)
    }

    /// Settle every queued entry into `asset`. A no-op with an empty queue.
    pub fn settle<B: Balances>(
        &mut self,
        account: &AccountId,
        asset: &AssetId,
        rates: &ExchangeRates,
        balances: &mut B,
        now: Timestamp,
    ) -> SynthResult<Option<SettlementPlan>> {
        let Some(plan) = self.plan_settlement(account, asset, rates, &*balances, now)? else {
            tracing::debug!(account = %account, asset = %asset, "Nothing to settle");
            return Ok(None);
        };
        self.apply_settlement(&plan, balances)?;
        Ok(Some(plan))
    }

    /// Exchange `amount` of `src` into `dest` for `account`.
    ///
    /// Registration of both synths is checked by the caller.
    pub fn exchange<B: Balances>(
        &mut self,
        request: &ExchangeRequest<'_>,
        rates: &ExchangeRates,
        balances: &mut B,
        now: Timestamp,
    ) -> SynthResult<ExchangeOutcome> {
        let ExchangeRequest {
            account,
            src,
            amount,
            dest,
            fee_rate,
            base_asset,
            fee_address,
        } = *request;

        if !self.exchange_enabled {
            return Err(SynthError::ExchangeDisabled);
        }
        if src == dest {
            return Err(SynthError::Validation(format!(
                "cannot exchange {} into itself",
                src
            )));
        }
        if amount.is_zero() {
            return Err(SynthError::InvalidAmount(
                "exchange amount must be greater than zero".to_string(),
            ));
        }
        rates.ensure_fresh([src, dest], now)?;

        let source_settlement = self.settlement_gate(account, src, amount, rates, &*balances, now)?;
        let dest_settlement = self.plan_through(
            account,
            dest,
            self.settleable_cutoff(now),
            rates,
            &*balances,
            now,
        )?;
        let leaving = dest_settlement.as_ref().map(|p| p.num_entries).unwrap_or(0);
        self.state.ensure_capacity(account, dest, leaving, 1)?;

        let fee_rate = fee_rate.min(Decimal::ONE);
        let effective = rates.effective_value(src, amount, dest)?;
        let amount_received = Self::amount_after_fee(effective, fee_rate)?;
        if amount_received.is_zero() {
            return Err(SynthError::InvalidAmount(format!(
                "exchanging {} {} yields nothing after fees",
                amount, src
            )));
        }
        let fee = effective.saturating_sub(amount_received);
        let fee_in_base = rates.effective_value(dest, fee, base_asset)?;

        if let Some(plan) = &source_settlement {
            self.apply_settlement(plan, balances)?;
        }
        if let Some(plan) = &dest_settlement {
            self.apply_settlement(plan, balances)?;
        }
        balances.burn(src, account, amount)?;
        balances.mint(dest, account, amount_received)?;
        if !fee_in_base.is_zero() {
            balances.mint(base_asset, fee_address, fee_in_base)?;
        }
        self.state.append_exchange_entry(
            account,
            ExchangeEntry {
                src: src.clone(),
                amount,
                dest: dest.clone(),
                amount_received,
                exchange_fee_rate: fee_rate,
                timestamp: now,
                round_id_for_src: rates.current_round_id(src),
                round_id_for_dest: rates.current_round_id(dest),
            },
        )?;

        tracing::info!(
            account = %account,
            src = %src,
            amount = %amount,
            dest = %dest,
            amount_received = %amount_received,
            fee = %fee_in_base,
            "Synth exchange"
        );

        Ok(ExchangeOutcome {
            account: account.clone(),
            src: src.clone(),
            amount,
            dest: dest.clone(),
            amount_received,
            fee,
            fee_in_base,
            fee_rate,
            source_settlement,
            dest_settlement,
        })
    }
}
