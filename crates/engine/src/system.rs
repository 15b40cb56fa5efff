//! `SynthSystem`: the facade that wires the oracle, issuer, exchanger, fee
//! pool and liquidations together over one set of balances.
//!
//! Each public operation runs to completion against `&mut self`. Everything
//! that can fail is checked before the first mutation, and every mutation
//! appends a [`LedgerEvent`] to the in-memory event log.

use serde_json::json;

use synth_common::clock::{Clock, ManualClock};
use synth_common::config::{self, EngineConfig};
use synth_common::error::OrOverflow;
use synth_common::types::{EventType, LedgerEvent};
use synth_common::{AccountId, AssetClass, AssetId, Decimal, SynthError, SynthResult, Timestamp};
use synth_oracle::{ExchangeRates, OracleSettings, RatesUpdate};

use crate::balances::{Balances, CollateralEscrow, InMemoryBalances, InMemoryEscrow};
use crate::debt_ledger::DebtLedger;
use crate::exchange_state::ExchangeEntry;
use crate::exchanger::{ExchangeOutcome, ExchangeRequest, Exchanger, SettlementOwing, SettlementPlan};
use crate::fee_pool::{ClosedFeePeriod, FeeClaim, FeeKind, FeePeriod, FeePool, PeriodFees};
use crate::issuer::{DebtChange, IssuanceData, Issuer, RemainingIssuable};
use crate::liquidations::{LiquidationEntry, Liquidations};

/// Result of a `liquidate_delinquent_account` call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LiquidationOutcome {
    pub account: AccountId,
    pub liquidator: AccountId,
    pub amount_burned: Decimal,
    pub collateral_redeemed: Decimal,
    pub flag_removed: bool,
}

pub struct SynthSystem<B, E, C> {
    config: EngineConfig,
    rates: ExchangeRates,
    issuer: Issuer,
    exchanger: Exchanger,
    fee_pool: FeePool,
    liquidations: Liquidations,
    balances: B,
    escrow: E,
    clock: C,
    events: Vec<LedgerEvent>,
}

/// A system backed entirely by in-memory collaborators.
pub type InMemorySystem<C = ManualClock> = SynthSystem<InMemoryBalances, InMemoryEscrow, C>;

impl<C: Clock> SynthSystem<InMemoryBalances, InMemoryEscrow, C> {
    pub fn in_memory(config: EngineConfig, clock: C) -> SynthResult<Self> {
        Self::new(config, InMemoryBalances::new(), InMemoryEscrow::new(), clock)
    }
}

impl<B: Balances, E: CollateralEscrow, C: Clock> SynthSystem<B, E, C> {
    pub fn new(config: EngineConfig, balances: B, escrow: E, clock: C) -> SynthResult<Self> {
        config.validate()?;
        let now = clock.now();
        let system = Self {
            rates: ExchangeRates::new(config.base_asset.clone(), OracleSettings::from(&config)),
            issuer: Issuer::new(&config)?,
            exchanger: Exchanger::new(&config),
            fee_pool: FeePool::new(&config, now),
            liquidations: Liquidations::new(&config),
            balances,
            escrow,
            clock,
            events: Vec::new(),
            config,
        };
        tracing::info!(
            base_asset = %system.config.base_asset,
            collateral_asset = %system.config.collateral_asset,
            synths = system.issuer.synths().len(),
            "Synth system initialised"
        );
        Ok(system)
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rates(&self) -> &ExchangeRates {
        &self.rates
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    pub fn exchanger(&self) -> &Exchanger {
        &self.exchanger
    }

    pub fn fee_pool(&self) -> &FeePool {
        &self.fee_pool
    }

    pub fn liquidations(&self) -> &Liquidations {
        &self.liquidations
    }

    pub fn balances(&self) -> &B {
        &self.balances
    }

    /// Direct access to the balance collaborator, e.g. to fund accounts.
    pub fn balances_mut(&mut self) -> &mut B {
        &mut self.balances
    }

    pub fn escrow(&self) -> &E {
        &self.escrow
    }

    pub fn escrow_mut(&mut self) -> &mut E {
        &mut self.escrow
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Decimal {
        self.balances.balance_of(asset, account)
    }

    fn emit(&mut self, event_type: EventType, account: Option<&AccountId>, data: serde_json::Value) {
        let event = LedgerEvent::new(event_type, account, self.clock.now(), data);
        tracing::debug!(event_type = %event.event_type, event_id = %event.id, "Ledger event");
        self.events.push(event);
    }

    fn ensure_owner(&self, caller: &AccountId) -> SynthResult<()> {
        if *caller != self.config.owner {
            return Err(SynthError::Unauthorized(format!(
                "{} is not the owner",
                caller
            )));
        }
        Ok(())
    }

    fn ensure_oracle(&self, caller: &AccountId) -> SynthResult<()> {
        if *caller != self.config.oracle {
            return Err(SynthError::Unauthorized(format!(
                "{} is not the oracle",
                caller
            )));
        }
        Ok(())
    }

    fn setting_updated(&mut self, caller: &AccountId, setting: &str, value: serde_json::Value) {
        self.emit(
            EventType::SettingUpdated,
            Some(caller),
            json!({ "setting": setting, "value": value }),
        );
    }

    fn ensure_positive(amount: Decimal, what: &str) -> SynthResult<()> {
        if amount.is_zero() {
            return Err(SynthError::InvalidAmount(format!(
                "{} amount must be greater than zero",
                what
            )));
        }
        Ok(())
    }

    // ============================================================
    // Oracle
    // ============================================================

    pub fn update_rates(
        &mut self,
        caller: &AccountId,
        assets: &[AssetId],
        rates: &[Decimal],
        time_sent: Timestamp,
    ) -> SynthResult<RatesUpdate> {
        self.ensure_oracle(caller)?;
        let now = self.now();
        let update = self.rates.update_rates(assets, rates, time_sent, now)?;
        if !update.applied.is_empty() {
            let applied: Vec<_> = update
                .applied
                .iter()
                .map(|(asset, round)| json!({ "asset": asset, "rate": round.rate, "round_id": round.round_id }))
                .collect();
            self.emit(
                EventType::RatesUpdated,
                None,
                json!({ "rates": applied, "time_sent": time_sent, "skipped": update.skipped }),
            );
        }
        for asset in &update.frozen {
            let rate = self.rates.rate_for_currency(asset);
            self.emit(
                EventType::InversePriceFrozen,
                None,
                json!({ "asset": asset, "rate": rate }),
            );
        }
        Ok(update)
    }

    pub fn delete_rate(&mut self, caller: &AccountId, asset: &AssetId) -> SynthResult<()> {
        self.ensure_oracle(caller)?;
        let removed = self.rates.delete_rate(asset)?;
        self.emit(
            EventType::RateDeleted,
            None,
            json!({ "asset": asset, "round_id": removed.round_id }),
        );
        Ok(())
    }

    pub fn set_rate_stale_period(
        &mut self,
        caller: &AccountId,
        asset: Option<&AssetId>,
        secs: u64,
    ) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.rates.set_rate_stale_period(asset, secs);
        self.setting_updated(
            caller,
            "rate_stale_period",
            json!({ "asset": asset, "secs": secs }),
        );
        Ok(())
    }

    /// Set inverse pricing for a registered inverse synth.
    pub fn set_inverse_pricing(
        &mut self,
        caller: &AccountId,
        asset: &AssetId,
        entry_point: Decimal,
        upper_limit: Decimal,
        lower_limit: Decimal,
    ) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        if self.issuer.ensure_synth(asset)? != AssetClass::Inverse {
            return Err(SynthError::Validation(format!(
                "{} is not an inverse synth",
                asset
            )));
        }
        self.rates
            .set_inverse_pricing(asset, entry_point, upper_limit, lower_limit)?;
        self.setting_updated(
            caller,
            "inverse_pricing",
            json!({
                "asset": asset,
                "entry_point": entry_point,
                "upper_limit": upper_limit,
                "lower_limit": lower_limit,
            }),
        );
        Ok(())
    }

    pub fn remove_inverse_pricing(&mut self, caller: &AccountId, asset: &AssetId) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        if self.rates.remove_inverse_pricing(asset).is_none() {
            return Err(SynthError::Validation(format!(
                "{} has no inverse pricing",
                asset
            )));
        }
        self.setting_updated(caller, "inverse_pricing_removed", json!({ "asset": asset }));
        Ok(())
    }

    pub fn rate_for_currency(&self, asset: &AssetId) -> Decimal {
        self.rates.rate_for_currency(asset)
    }

    pub fn rate_is_stale(&self, asset: &AssetId) -> bool {
        self.rates.rate_is_stale(asset, self.now())
    }

    pub fn any_rate_is_stale(&self, assets: &[AssetId]) -> bool {
        self.rates.any_rate_is_stale(assets, self.now())
    }

    pub fn effective_value(&self, src: &AssetId, amount: Decimal, dest: &AssetId) -> SynthResult<Decimal> {
        self.rates.ensure_fresh([src, dest], self.now())?;
        self.rates.effective_value(src, amount, dest)
    }

    // ============================================================
    // Issuer
    // ============================================================

    pub fn synths(&self) -> &[(AssetId, AssetClass)] {
        self.issuer.synths()
    }

    pub fn add_synth(&mut self, caller: &AccountId, asset: &AssetId, class: AssetClass) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.issuer.add_synth(asset, class)?;
        self.emit(
            EventType::SynthAdded,
            None,
            json!({ "asset": asset, "class": class }),
        );
        Ok(())
    }

    pub fn remove_synth(&mut self, caller: &AccountId, asset: &AssetId) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        let class = self.issuer.remove_synth(asset, &self.balances)?;
        self.rates.remove_inverse_pricing(asset);
        self.emit(
            EventType::SynthRemoved,
            None,
            json!({ "asset": asset, "class": class }),
        );
        Ok(())
    }

    fn ensure_rates_fresh(&self) -> SynthResult<()> {
        self.issuer.ensure_rates_fresh(&self.rates, self.now())
    }

    pub fn total_issued_synths(&self, currency: &AssetId) -> SynthResult<Decimal> {
        self.ensure_rates_fresh()?;
        self.rates.ensure_fresh([currency], self.now())?;
        self.issuer
            .total_issued_synths(currency, &self.rates, &self.balances)
    }

    pub fn debt_balance_of(&self, account: &AccountId, currency: &AssetId) -> SynthResult<Decimal> {
        self.ensure_rates_fresh()?;
        self.rates.ensure_fresh([currency], self.now())?;
        self.issuer
            .debt_balance_of(account, currency, &self.rates, &self.balances)
    }

    pub fn collateral(&self, account: &AccountId) -> SynthResult<Decimal> {
        self.issuer.collateral(account, &self.balances, &self.escrow)
    }

    pub fn max_issuable_synths(&self, account: &AccountId) -> SynthResult<Decimal> {
        self.ensure_rates_fresh()?;
        self.issuer
            .max_issuable_synths(account, &self.rates, &self.balances, &self.escrow)
    }

    pub fn remaining_issuable_synths(&self, account: &AccountId) -> SynthResult<RemainingIssuable> {
        self.ensure_rates_fresh()?;
        self.issuer
            .remaining_issuable_synths(account, &self.rates, &self.balances, &self.escrow)
    }

    pub fn collateralisation_ratio(&self, account: &AccountId) -> SynthResult<Decimal> {
        self.ensure_rates_fresh()?;
        self.issuer
            .collateralisation_ratio(account, &self.rates, &self.balances, &self.escrow)
    }

    pub fn issuance_data(&self, account: &AccountId) -> Option<IssuanceData> {
        self.issuer.issuance_data(account)
    }

    pub fn debt_ledger(&self) -> &DebtLedger {
        self.issuer.debt_ledger()
    }

    pub fn set_issuance_ratio(&mut self, caller: &AccountId, ratio: Decimal) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        config::validate_issuance_ratio(ratio)?;
        config::validate_liquidation_ratio(
            self.liquidations.liquidation_ratio(),
            ratio,
            self.liquidations.liquidation_penalty(),
        )?;
        self.issuer.set_issuance_ratio(ratio);
        self.setting_updated(caller, "issuance_ratio", json!(ratio));
        Ok(())
    }

    fn record_debt_change(&mut self, change: &DebtChange, event_type: EventType) {
        self.fee_pool.append_account_issuance_record(
            &change.account,
            change.record.initial_debt_ownership,
            change.ledger_index,
        );
        self.emit(event_type, Some(&change.account), json!(change));
    }

    fn record_settlement(&mut self, plan: &SettlementPlan) {
        if !plan.reclaim.is_zero() {
            self.emit(
                EventType::ExchangeReclaim,
                Some(&plan.account),
                json!({ "asset": plan.asset, "amount": plan.reclaim, "entries": plan.num_entries }),
            );
        }
        if !plan.rebate.is_zero() {
            self.emit(
                EventType::ExchangeRebate,
                Some(&plan.account),
                json!({ "asset": plan.asset, "amount": plan.rebate, "entries": plan.num_entries }),
            );
        }
    }

    /// Apply a settlement returned by the gate, if any.
    fn apply_gate(&mut self, plan: Option<SettlementPlan>) -> SynthResult<Option<SettlementPlan>> {
        if let Some(plan) = &plan {
            self.exchanger.apply_settlement(plan, &mut self.balances)?;
            self.record_settlement(plan);
        }
        Ok(plan)
    }

    pub fn issue_synths(&mut self, account: &AccountId, amount: Decimal) -> SynthResult<DebtChange> {
        let now = self.now();
        let change = self.issuer.issue(
            account,
            amount,
            &self.rates,
            &mut self.balances,
            &self.escrow,
            now,
        )?;
        self.record_debt_change(&change, EventType::SynthsIssued);
        Ok(change)
    }

    pub fn issue_max_synths(&mut self, account: &AccountId) -> SynthResult<DebtChange> {
        let remaining = self.remaining_issuable_synths(account)?;
        if remaining.remaining.is_zero() {
            return Err(SynthError::ExceedsMaxIssuable {
                requested: Decimal::ZERO,
                remaining: Decimal::ZERO,
            });
        }
        self.issue_synths(account, remaining.remaining)
    }

    /// Burn base synths to repay debt. Burns at most the current debt.
    pub fn burn_synths(&mut self, account: &AccountId, amount: Decimal) -> SynthResult<DebtChange> {
        Self::ensure_positive(amount, "burn")?;
        let now = self.now();
        let base = self.config.base_asset.clone();
        let debt = self.debt_balance_of(account, &base)?;
        if debt.is_zero() {
            return Err(SynthError::InsufficientDebt(account.clone()));
        }
        let settlement = self.exchanger.settlement_gate(
            account,
            &base,
            amount.min(debt),
            &self.rates,
            &self.balances,
            now,
        )?;
        let burn = self.issuer.plan_burn(
            account,
            account,
            amount,
            settlement.as_ref(),
            &self.rates,
            &self.balances,
            now,
        )?;

        self.apply_gate(settlement)?;
        let change = self.issuer.apply_burn(burn, &mut self.balances)?;
        self.record_debt_change(&change, EventType::SynthsBurned);
        self.remove_flag_if_restored(account)?;
        Ok(change)
    }

    /// Burn just enough to bring the account back to the issuance ratio.
    pub fn burn_synths_to_target(&mut self, account: &AccountId) -> SynthResult<DebtChange> {
        let remaining = self.remaining_issuable_synths(account)?;
        if remaining.already_issued <= remaining.max_issuable {
            return Err(SynthError::InvalidAmount(format!(
                "{} is already at or below the issuance ratio",
                account
            )));
        }
        let excess = remaining
            .already_issued
            .saturating_sub(remaining.max_issuable);
        self.burn_synths(account, excess)
    }

    fn remove_flag_if_restored(&mut self, account: &AccountId) -> SynthResult<()> {
        if !self.liquidations.is_flagged(account) {
            return Ok(());
        }
        let ratio = self.collateralisation_ratio(account)?;
        if ratio < self.liquidations.liquidation_ratio() && self.liquidations.remove(account).is_some() {
            self.emit(
                EventType::AccountRemovedFromLiquidation,
                Some(account),
                json!({ "ratio": ratio }),
            );
        }
        Ok(())
    }

    // ============================================================
    // Exchanger
    // ============================================================

    pub fn exchange(
        &mut self,
        account: &AccountId,
        src: &AssetId,
        amount: Decimal,
        dest: &AssetId,
    ) -> SynthResult<ExchangeOutcome> {
        let src_class = self.issuer.ensure_synth(src)?;
        let dest_class = self.issuer.ensure_synth(dest)?;
        let fee_rate = self
            .fee_pool
            .exchange_fee_rate_for(dest, src_class, dest_class)?;
        let now = self.now();
        let request = ExchangeRequest {
            account,
            src,
            amount,
            dest,
            fee_rate,
            base_asset: &self.config.base_asset,
            fee_address: &self.config.fee_address,
        };
        let outcome = self
            .exchanger
            .exchange(&request, &self.rates, &mut self.balances, now)?;

        self.fee_pool.record_fee(outcome.fee_in_base, FeeKind::Fees)?;
        for plan in [&outcome.source_settlement, &outcome.dest_settlement]
            .into_iter()
            .flatten()
        {
            self.record_settlement(plan);
        }
        self.emit(
            EventType::SynthExchange,
            Some(account),
            json!({
                "src": src,
                "amount": amount,
                "dest": dest,
                "amount_received": outcome.amount_received,
                "fee": outcome.fee_in_base,
                "fee_rate": outcome.fee_rate,
            }),
        );
        Ok(outcome)
    }

    pub fn settle(&mut self, account: &AccountId, asset: &AssetId) -> SynthResult<Option<SettlementPlan>> {
        self.issuer.ensure_synth(asset)?;
        let now = self.now();
        let plan = self
            .exchanger
            .settle(account, asset, &self.rates, &mut self.balances, now)?;
        if let Some(plan) = &plan {
            self.record_settlement(plan);
        }
        Ok(plan)
    }

    pub fn settlement_owing(&self, account: &AccountId, asset: &AssetId) -> SynthResult<SettlementOwing> {
        self.exchanger
            .settlement_owing(account, asset, &self.rates, self.now())
    }

    pub fn max_secs_left_in_waiting_period(&self, account: &AccountId, asset: &AssetId) -> u64 {
        self.exchanger
            .max_secs_left_in_waiting_period(account, asset, self.now())
    }

    pub fn exchange_entries(&self, account: &AccountId, asset: &AssetId) -> &[ExchangeEntry] {
        self.exchanger.state().entries(account, asset)
    }

    /// Transfer a synth, settling the sender's queue first.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetId,
        amount: Decimal,
    ) -> SynthResult<Option<SettlementPlan>> {
        Self::ensure_positive(amount, "transfer")?;
        self.issuer.ensure_synth(asset)?;
        let now = self.now();
        let plan = self
            .exchanger
            .settlement_gate(from, asset, amount, &self.rates, &self.balances, now)?;

        let plan = self.apply_gate(plan)?;
        self.balances.transfer(asset, from, to, amount)?;
        tracing::info!(from = %from, to = %to, asset = %asset, amount = %amount, "Synth transfer");
        self.emit(
            EventType::Transfer,
            Some(from),
            json!({ "to": to, "asset": asset, "amount": amount }),
        );
        Ok(plan)
    }

    pub fn set_waiting_period_secs(&mut self, caller: &AccountId, secs: u64) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.exchanger.set_waiting_period_secs(secs);
        self.setting_updated(caller, "waiting_period_secs", json!(secs));
        Ok(())
    }

    pub fn set_exchange_enabled(&mut self, caller: &AccountId, enabled: bool) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.exchanger.set_exchange_enabled(enabled);
        self.setting_updated(caller, "exchange_enabled", json!(enabled));
        Ok(())
    }

    pub fn set_max_entries_in_queue(&mut self, caller: &AccountId, max: usize) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.exchanger.set_max_entries_in_queue(max)?;
        self.setting_updated(caller, "max_entries_in_queue", json!(max));
        Ok(())
    }

    // ============================================================
    // Fee pool
    // ============================================================

    pub fn recent_fee_periods(&self) -> &[FeePeriod] {
        self.fee_pool.recent_fee_periods()
    }

    pub fn last_fee_withdrawal(&self, account: &AccountId) -> u64 {
        self.fee_pool.last_fee_withdrawal(account)
    }

    pub fn exchange_fee_rate_for(&self, src: &AssetId, dest: &AssetId) -> SynthResult<Decimal> {
        let src_class = self.issuer.ensure_synth(src)?;
        let dest_class = self.issuer.ensure_synth(dest)?;
        self.fee_pool.exchange_fee_rate_for(dest, src_class, dest_class)
    }

    pub fn close_current_fee_period(&mut self) -> SynthResult<ClosedFeePeriod> {
        let now = self.now();
        let ledger_len = self.issuer.debt_ledger().len();
        let closed = self.fee_pool.close_current_fee_period(now, ledger_len)?;
        let forfeited = !closed.forfeited_fees.is_zero() || !closed.forfeited_rewards.is_zero();
        if let Some(evicted) = closed.evicted.filter(|_| forfeited) {
            self.emit(
                EventType::FeesForfeited,
                None,
                json!({
                    "fee_period_id": evicted.fee_period_id,
                    "fees": closed.forfeited_fees,
                    "rewards": closed.forfeited_rewards,
                }),
            );
        }
        self.emit(
            EventType::FeePeriodClosed,
            None,
            json!({
                "closed": closed.closed.fee_period_id,
                "opened": closed.opened.fee_period_id,
                "fees_to_distribute": closed.closed.fees_to_distribute,
                "rewards_to_distribute": closed.closed.rewards_to_distribute,
                "starting_debt_index": closed.opened.starting_debt_index,
            }),
        );
        Ok(closed)
    }

    /// Record `amount` of collateral held by the rewards account as rewards
    /// for the open period.
    pub fn distribute_rewards(&mut self, caller: &AccountId, amount: Decimal) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        Self::ensure_positive(amount, "reward")?;
        let needed = self
            .fee_pool
            .outstanding_rewards()
            .checked_add(amount)
            .or_overflow()?;
        let available = self
            .balances
            .balance_of(&self.config.collateral_asset, &self.config.rewards_address);
        if available < needed {
            return Err(SynthError::InsufficientBalance {
                asset: self.config.collateral_asset.clone(),
                requested: needed,
                available,
            });
        }
        self.fee_pool.record_fee(amount, FeeKind::Rewards)?;
        tracing::info!(amount = %amount, "Rewards distributed");
        self.emit(
            EventType::RewardsDistributed,
            None,
            json!({
                "amount": amount,
                "fee_period_id": self.fee_pool.current_period().fee_period_id,
            }),
        );
        Ok(())
    }

    pub fn fees_available(&self, account: &AccountId) -> SynthResult<(Decimal, Decimal)> {
        self.fee_pool
            .fees_available(account, self.issuer.debt_ledger())
    }

    pub fn fees_by_period(&self, account: &AccountId) -> SynthResult<Vec<PeriodFees>> {
        self.fee_pool
            .fees_by_period(account, self.issuer.debt_ledger())
    }

    pub fn is_fees_claimable(&self, account: &AccountId) -> SynthResult<bool> {
        let ratio = self.collateralisation_ratio(account)?;
        Ok(self
            .fee_pool
            .ensure_fees_claimable(ratio, self.issuer.issuance_ratio())
            .is_ok())
    }

    /// Pay out every unclaimed fee and reward owed to `account`.
    pub fn claim_fees(&mut self, account: &AccountId) -> SynthResult<FeeClaim> {
        let ratio = self.collateralisation_ratio(account)?;
        self.fee_pool
            .ensure_fees_claimable(ratio, self.issuer.issuance_ratio())?;
        let claim = self
            .fee_pool
            .plan_claim(account, self.issuer.debt_ledger())?;

        let base = &self.config.base_asset;
        let collateral = &self.config.collateral_asset;
        let fee_balance = self.balances.balance_of(base, &self.config.fee_address);
        if fee_balance < claim.fees {
            return Err(SynthError::InsufficientBalance {
                asset: base.clone(),
                requested: claim.fees,
                available: fee_balance,
            });
        }
        let reward_balance = self
            .balances
            .balance_of(collateral, &self.config.rewards_address);
        if reward_balance < claim.rewards {
            return Err(SynthError::InsufficientBalance {
                asset: collateral.clone(),
                requested: claim.rewards,
                available: reward_balance,
            });
        }

        self.fee_pool.apply_claim(&claim);
        if !claim.fees.is_zero() {
            self.balances
                .transfer(base, &self.config.fee_address, account, claim.fees)?;
        }
        if !claim.rewards.is_zero() {
            self.balances
                .transfer(collateral, &self.config.rewards_address, account, claim.rewards)?;
        }
        self.emit(EventType::FeesClaimed, Some(account), json!(claim));
        Ok(claim)
    }

    pub fn set_exchange_fee_rate(&mut self, caller: &AccountId, rate: Decimal) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.fee_pool.set_exchange_fee_rate(rate)?;
        self.setting_updated(caller, "exchange_fee_rate", json!(rate));
        Ok(())
    }

    pub fn set_exchange_fee_rate_for_synth(
        &mut self,
        caller: &AccountId,
        asset: &AssetId,
        rate: Decimal,
    ) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.issuer.ensure_synth(asset)?;
        self.fee_pool.set_exchange_fee_rate_for_synth(asset, rate)?;
        self.setting_updated(
            caller,
            "exchange_fee_rate_for_synth",
            json!({ "asset": asset, "rate": rate }),
        );
        Ok(())
    }

    pub fn set_fee_class_multiplier(
        &mut self,
        caller: &AccountId,
        src: AssetClass,
        dest: AssetClass,
        multiplier: Decimal,
    ) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.fee_pool.set_fee_class_multiplier(src, dest, multiplier)?;
        self.setting_updated(
            caller,
            "fee_class_multiplier",
            json!({ "src": src, "dest": dest, "multiplier": multiplier }),
        );
        Ok(())
    }

    pub fn set_fee_period_duration(&mut self, caller: &AccountId, secs: u64) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.fee_pool.set_fee_period_duration(secs)?;
        self.setting_updated(caller, "fee_period_duration_secs", json!(secs));
        Ok(())
    }

    pub fn set_target_threshold(&mut self, caller: &AccountId, threshold: Decimal) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.fee_pool.set_target_threshold(threshold)?;
        self.setting_updated(caller, "target_threshold", json!(threshold));
        Ok(())
    }

    // ============================================================
    // Liquidations
    // ============================================================

    pub fn liquidation_entry(&self, account: &AccountId) -> Option<&LiquidationEntry> {
        self.liquidations.entry(account)
    }

    pub fn flag_account_for_liquidation(
        &mut self,
        account: &AccountId,
        flagger: &AccountId,
    ) -> SynthResult<LiquidationEntry> {
        if self.liquidations.is_flagged(account) {
            return Err(SynthError::AlreadyFlagged(account.clone()));
        }
        let ratio = self.collateralisation_ratio(account)?;
        let now = self.now();
        let entry = self
            .liquidations
            .flag_account(account, Some(flagger), ratio, now)?;
        self.emit(
            EventType::AccountFlaggedForLiquidation,
            Some(account),
            json!({ "deadline": entry.deadline, "flagged_by": flagger, "ratio": ratio }),
        );
        Ok(entry)
    }

    pub fn is_liquidation_deadline_passed(&self, account: &AccountId) -> bool {
        self.liquidations
            .is_liquidation_deadline_passed(account, self.now())
    }

    pub fn is_open_for_liquidation(&self, account: &AccountId) -> SynthResult<bool> {
        if !self.liquidations.is_flagged(account) {
            return Ok(false);
        }
        let ratio = self.collateralisation_ratio(account)?;
        Ok(self
            .liquidations
            .is_open_for_liquidation(account, ratio, self.now()))
    }

    /// Remove the flag if the account's ratio is back under the liquidation ratio.
    pub fn check_and_remove_account_in_liquidation(&mut self, account: &AccountId) -> SynthResult<bool> {
        if !self.liquidations.is_flagged(account) {
            return Err(SynthError::NoLiquidationSet(account.clone()));
        }
        let ratio = self.collateralisation_ratio(account)?;
        let removed = self.liquidations.check_and_remove(account, ratio)?;
        if removed {
            self.emit(
                EventType::AccountRemovedFromLiquidation,
                Some(account),
                json!({ "ratio": ratio }),
            );
        }
        Ok(removed)
    }

    /// Debt to burn to bring an account back to the issuance ratio after
    /// paying collateral at the liquidation penalty.
    pub fn calculate_amount_to_fix_collateral(
        &self,
        debt: Decimal,
        collateral_value: Decimal,
    ) -> SynthResult<Decimal> {
        self.liquidations.calculate_amount_to_fix_collateral(
            debt,
            collateral_value,
            self.issuer.issuance_ratio(),
        )
    }

    /// Burn up to `amount` of the liquidator's base synth against the
    /// account's debt and pay the liquidator collateral at the penalty.
    pub fn liquidate_delinquent_account(
        &mut self,
        account: &AccountId,
        liquidator: &AccountId,
        amount: Decimal,
    ) -> SynthResult<LiquidationOutcome> {
        Self::ensure_positive(amount, "liquidation")?;
        if account == liquidator {
            return Err(SynthError::Validation(
                "an account cannot liquidate itself".to_string(),
            ));
        }
        let now = self.now();
        let ratio = self.collateralisation_ratio(account)?;
        self.liquidations
            .ensure_open_for_liquidation(account, ratio, now)?;

        let base = self.config.base_asset.clone();
        let collateral_asset = self.config.collateral_asset.clone();
        let debt = self.debt_balance_of(account, &base)?;
        let collateral_value =
            self.issuer
                .collateral_value(account, &self.rates, &self.balances, &self.escrow)?;
        let amount_to_fix = self.calculate_amount_to_fix_collateral(debt, collateral_value)?;

        let penalty_factor = Decimal::ONE.saturating_add(self.liquidations.liquidation_penalty());
        let free_collateral = self.balances.balance_of(&collateral_asset, account);
        let mut to_burn = amount.min(amount_to_fix).min(debt);
        let capped = self.rates.effective_value(
            &base,
            to_burn.checked_mul(penalty_factor).or_overflow()?,
            &collateral_asset,
        )? > free_collateral;
        if capped {
            to_burn = self
                .rates
                .effective_value(&collateral_asset, free_collateral, &base)?
                .checked_div(penalty_factor)
                .or_overflow()?;
        }
        if to_burn.is_zero() {
            return Err(SynthError::InvalidAmount(format!(
                "nothing to liquidate for {}",
                account
            )));
        }

        let settlement = self.exchanger.settlement_gate(
            liquidator,
            &base,
            to_burn,
            &self.rates,
            &self.balances,
            now,
        )?;
        // The liquidator's settlement moves the total, so the debt actually
        // burned can come out below `to_burn`
        let burn = self.issuer.plan_burn(
            account,
            liquidator,
            to_burn,
            settlement.as_ref(),
            &self.rates,
            &self.balances,
            now,
        )?;
        let collateral_redeemed = if capped && burn.burned == to_burn {
            free_collateral
        } else {
            self.rates
                .effective_value(
                    &base,
                    burn.burned.checked_mul(penalty_factor).or_overflow()?,
                    &collateral_asset,
                )?
                .min(free_collateral)
        };
        let fully_fixed = !capped && (burn.burned >= amount_to_fix || burn.debt_after.is_zero());

        self.apply_gate(settlement)?;
        let change = self.issuer.apply_burn(burn, &mut self.balances)?;
        self.fee_pool.append_account_issuance_record(
            account,
            change.record.initial_debt_ownership,
            change.ledger_index,
        );
        self.balances
            .transfer(&collateral_asset, account, liquidator, collateral_redeemed)?;
        let flag_removed = fully_fixed && self.liquidations.remove(account).is_some();

        let outcome = LiquidationOutcome {
            account: account.clone(),
            liquidator: liquidator.clone(),
            amount_burned: change.amount,
            collateral_redeemed,
            flag_removed,
        };
        tracing::info!(
            account = %account,
            liquidator = %liquidator,
            burned = %outcome.amount_burned,
            collateral = %collateral_redeemed,
            "Account liquidated"
        );
        self.emit(EventType::AccountLiquidated, Some(account), json!(outcome));
        if flag_removed {
            self.emit(
                EventType::AccountRemovedFromLiquidation,
                Some(account),
                json!({ "liquidated": true }),
            );
        }
        Ok(outcome)
    }

    pub fn set_liquidation_ratio(&mut self, caller: &AccountId, ratio: Decimal) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.liquidations
            .set_liquidation_ratio(ratio, self.issuer.issuance_ratio())?;
        self.setting_updated(caller, "liquidation_ratio", json!(ratio));
        Ok(())
    }

    pub fn set_liquidation_penalty(&mut self, caller: &AccountId, penalty: Decimal) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        config::validate_liquidation_ratio(
            self.liquidations.liquidation_ratio(),
            self.issuer.issuance_ratio(),
            penalty,
        )?;
        self.liquidations.set_liquidation_penalty(penalty)?;
        self.setting_updated(caller, "liquidation_penalty", json!(penalty));
        Ok(())
    }

    pub fn set_liquidation_delay(&mut self, caller: &AccountId, secs: u64) -> SynthResult<()> {
        self.ensure_owner(caller)?;
        self.liquidations.set_liquidation_delay(secs)?;
        self.setting_updated(caller, "liquidation_delay_secs", json!(secs));
        Ok(())
    }
}
