//! Fee pool: collects exchange fees and reward emissions per fee period and
//! pays them out pro rata to debt held when each period closed.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use synth_common::config::{self, EngineConfig};
use synth_common::error::OrOverflow;
use synth_common::{
    AccountId, AssetClass, AssetId, Decimal, PreciseDecimal, SynthError, SynthResult, Timestamp,
};

use crate::debt_ledger::DebtLedger;

/// Upper bound for a class-pair fee multiplier.
pub const MAX_FEE_CLASS_MULTIPLIER: Decimal = Decimal::from_int(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Fees,
    Rewards,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeePeriod {
    /// 0 for a slot that has never held a period.
    pub fee_period_id: u64,
    pub starting_debt_index: usize,
    pub start_time: Timestamp,
    pub fees_to_distribute: Decimal,
    pub fees_claimed: Decimal,
    pub rewards_to_distribute: Decimal,
    pub rewards_claimed: Decimal,
}

impl FeePeriod {
    pub fn fees_remaining(&self) -> Decimal {
        self.fees_to_distribute.saturating_sub(self.fees_claimed)
    }

    pub fn rewards_remaining(&self) -> Decimal {
        self.rewards_to_distribute.saturating_sub(self.rewards_claimed)
    }
}

/// Fees and rewards an account can claim from one closed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodFees {
    pub fee_period_id: u64,
    pub fees: Decimal,
    pub rewards: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedFeePeriod {
    pub closed: FeePeriod,
    pub opened: FeePeriod,
    /// Period pushed out of the ring, if the slot was in use.
    pub evicted: Option<FeePeriod>,
    pub forfeited_fees: Decimal,
    pub forfeited_rewards: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeClaim {
    pub account: AccountId,
    pub fees: Decimal,
    pub rewards: Decimal,
    pub periods: Vec<PeriodFees>,
    pub last_fee_withdrawal: u64,
}

/// Ownership recorded at a ledger index, kept per account for past periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IssuanceRecord {
    pub debt_ownership: PreciseDecimal,
    pub ledger_index: usize,
}

pub struct FeePool {
    /// Index 0 is the open period.
    periods: Vec<FeePeriod>,
    next_fee_period_id: u64,
    fee_period_duration_secs: u64,
    target_threshold: Decimal,
    exchange_fee_rate: Decimal,
    synth_fee_rates: HashMap<AssetId, Decimal>,
    class_multipliers: HashMap<(AssetClass, AssetClass), Decimal>,
    /// Newest first, at most one per period.
    issuance_history: HashMap<AccountId, VecDeque<IssuanceRecord>>,
    last_fee_withdrawal: HashMap<AccountId, u64>,
}

impl FeePool {
    pub fn new(config: &EngineConfig, now: Timestamp) -> Self {
        let count = config
            .fee_period_count
            .max(config::limits::MIN_FEE_PERIOD_COUNT);
        let mut periods = vec![FeePeriod::default(); count];
        periods[0] = FeePeriod {
            fee_period_id: 1,
            start_time: now,
            ..FeePeriod::default()
        };

        let double = Decimal::from_int(2);
        let class_multipliers = HashMap::from([
            ((AssetClass::Standard, AssetClass::Standard), Decimal::ONE),
            ((AssetClass::Standard, AssetClass::Inverse), double),
            ((AssetClass::Inverse, AssetClass::Standard), double),
            ((AssetClass::Inverse, AssetClass::Inverse), double),
        ]);

        Self {
            periods,
            next_fee_period_id: 2,
            fee_period_duration_secs: config.fee_period_duration_secs,
            target_threshold: config.target_threshold,
            exchange_fee_rate: config.exchange_fee_rate,
            synth_fee_rates: HashMap::new(),
            class_multipliers,
            issuance_history: HashMap::new(),
            last_fee_withdrawal: HashMap::new(),
        }
    }

    pub fn recent_fee_periods(&self) -> &[FeePeriod] {
        &self.periods
    }

    pub fn current_period(&self) -> &FeePeriod {
        &self.periods[0]
    }

    pub fn last_fee_withdrawal(&self, account: &AccountId) -> u64 {
        self.last_fee_withdrawal.get(account).copied().unwrap_or(0)
    }

    // ============================================================
    // Settings
    // ============================================================

    pub fn fee_period_duration_secs(&self) -> u64 {
        self.fee_period_duration_secs
    }

    pub fn set_fee_period_duration(&mut self, secs: u64) -> SynthResult<()> {
        config::validate_fee_period_duration(secs)?;
        self.fee_period_duration_secs = secs;
        tracing::info!(secs, "Fee period duration set");
        Ok(())
    }

    pub fn target_threshold(&self) -> Decimal {
        self.target_threshold
    }

    pub fn set_target_threshold(&mut self, threshold: Decimal) -> SynthResult<()> {
        config::validate_target_threshold(threshold)?;
        self.target_threshold = threshold;
        tracing::info!(threshold = %threshold, "Target threshold set");
        Ok(())
    }

    pub fn exchange_fee_rate(&self) -> Decimal {
        self.exchange_fee_rate
    }

    pub fn set_exchange_fee_rate(&mut self, rate: Decimal) -> SynthResult<()> {
        config::validate_exchange_fee_rate(rate)?;
        self.exchange_fee_rate = rate;
        tracing::info!(rate = %rate, "Exchange fee rate set");
        Ok(())
    }

    /// Override the base fee rate for exchanges into `asset`.
    pub fn set_exchange_fee_rate_for_synth(&mut self, asset: &AssetId, rate: Decimal) -> SynthResult<()> {
        config::validate_exchange_fee_rate(rate)?;
        self.synth_fee_rates.insert(asset.clone(), rate);
        tracing::info!(asset = %asset, rate = %rate, "Synth exchange fee rate set");
        Ok(())
    }

    pub fn fee_class_multiplier(&self, src: AssetClass, dest: AssetClass) -> Decimal {
        self.class_multipliers
            .get(&(src, dest))
            .copied()
            .unwrap_or(Decimal::ONE)
    }

    pub fn set_fee_class_multiplier(
        &mut self,
        src: AssetClass,
        dest: AssetClass,
        multiplier: Decimal,
    ) -> SynthResult<()> {
        if multiplier > MAX_FEE_CLASS_MULTIPLIER {
            return Err(SynthError::Validation(format!(
                "fee multiplier {} exceeds max {}",
                multiplier, MAX_FEE_CLASS_MULTIPLIER
            )));
        }
        self.class_multipliers.insert((src, dest), multiplier);
        tracing::info!(src = %src, dest = %dest, multiplier = %multiplier, "Fee class multiplier set");
        Ok(())
    }

    /// Fee rate for an exchange into `dest`: the synth's rate (or the base
    /// rate) times the class-pair multiplier, capped at 100%.
    pub fn exchange_fee_rate_for(
        &self,
        dest: &AssetId,
        src_class: AssetClass,
        dest_class: AssetClass,
    ) -> SynthResult<Decimal> {
        let base = self
            .synth_fee_rates
            .get(dest)
            .copied()
            .unwrap_or(self.exchange_fee_rate);
        let rate = base
            .checked_mul(self.fee_class_multiplier(src_class, dest_class))
            .or_overflow()?;
        Ok(rate.min(Decimal::ONE))
    }

    // ============================================================
    // Accrual
    // ============================================================

    pub fn record_fee(&mut self, amount: Decimal, kind: FeeKind) -> SynthResult<()> {
        let current = &mut self.periods[0];
        match kind {
            FeeKind::Fees => {
                current.fees_to_distribute = current.fees_to_distribute.checked_add(amount).or_overflow()?
            }
            FeeKind::Rewards => {
                current.rewards_to_distribute =
                    current.rewards_to_distribute.checked_add(amount).or_overflow()?
            }
        }
        tracing::debug!(
            amount = %amount,
            kind = ?kind,
            fee_period_id = current.fee_period_id,
            "Fee recorded"
        );
        Ok(())
    }

    /// Rewards recorded but not yet claimed, across the ring.
    pub fn outstanding_rewards(&self) -> Decimal {
        self.periods
            .iter()
            .fold(Decimal::ZERO, |acc, p| acc.saturating_add(p.rewards_remaining()))
    }

    /// Rotate the ring: open a new period starting at `debt_ledger_len` and
    /// drop the oldest one. Its unclaimed fees and rewards are forfeited.
    pub fn close_current_fee_period(
        &mut self,
        now: Timestamp,
        debt_ledger_len: usize,
    ) -> SynthResult<ClosedFeePeriod> {
        let ends_at = self.periods[0]
            .start_time
            .saturating_add(self.fee_period_duration_secs);
        if now < ends_at {
            return Err(SynthError::FeePeriodNotElapsed {
                secs_left: ends_at - now,
            });
        }

        let evicted = self.periods.pop().filter(|p| p.fee_period_id != 0);
        let opened = FeePeriod {
            fee_period_id: self.next_fee_period_id,
            starting_debt_index: debt_ledger_len,
            start_time: now,
            ..FeePeriod::default()
        };
        self.next_fee_period_id += 1;
        self.periods.insert(0, opened);
        let closed = self.periods[1];

        let (forfeited_fees, forfeited_rewards) = evicted
            .map(|p| (p.fees_remaining(), p.rewards_remaining()))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));
        if !forfeited_fees.is_zero() || !forfeited_rewards.is_zero() {
            tracing::warn!(
                fee_period_id = evicted.map(|p| p.fee_period_id).unwrap_or(0),
                fees = %forfeited_fees,
                rewards = %forfeited_rewards,
                "Unclaimed fees forfeited"
            );
        }
        tracing::info!(
            closed = closed.fee_period_id,
            opened = opened.fee_period_id,
            fees = %closed.fees_to_distribute,
            rewards = %closed.rewards_to_distribute,
            "Fee period closed"
        );

        Ok(ClosedFeePeriod {
            closed,
            opened,
            evicted,
            forfeited_fees,
            forfeited_rewards,
        })
    }

    // ============================================================
    // Entitlement
    // ============================================================

    /// Record an account's ownership after a mint or burn at `ledger_index`.
    ///
    /// Several changes within the open period collapse into one record, so
    /// the history always covers the whole ring.
    pub fn append_account_issuance_record(
        &mut self,
        account: &AccountId,
        debt_ownership: PreciseDecimal,
        ledger_index: usize,
    ) {
        let current_start = self.periods[0].starting_debt_index;
        let capacity = self.periods.len();
        let history = self.issuance_history.entry(account.clone()).or_default();
        let record = IssuanceRecord {
            debt_ownership,
            ledger_index,
        };
        match history.front_mut() {
            Some(front) if front.ledger_index >= current_start => *front = record,
            _ => {
                history.push_front(record);
                history.truncate(capacity);
            }
        }
    }

    pub fn issuance_history(&self, account: &AccountId) -> Vec<IssuanceRecord> {
        self.issuance_history
            .get(account)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Newest record at or before `closing_index`.
    pub fn applicable_issuance_data(&self, account: &AccountId, closing_index: usize) -> Option<IssuanceRecord> {
        self.issuance_history
            .get(account)?
            .iter()
            .find(|r| r.ledger_index <= closing_index)
            .copied()
    }

    /// Share of the pool `account` held when the period in slot `slot` closed.
    fn share_for_slot(&self, account: &AccountId, slot: usize, ledger: &DebtLedger) -> SynthResult<PreciseDecimal> {
        let next_start = self.periods[slot - 1].starting_debt_index;
        let Some(closing_index) = next_start.checked_sub(1) else {
            return Ok(PreciseDecimal::ZERO);
        };
        match self.applicable_issuance_data(account, closing_index) {
            Some(record) => ledger.share_at(record.debt_ownership, record.ledger_index, closing_index),
            None => Ok(PreciseDecimal::ZERO),
        }
    }

    /// Per closed period, oldest first. Periods already withdrawn report zero.
    pub fn fees_by_period(&self, account: &AccountId, ledger: &DebtLedger) -> SynthResult<Vec<PeriodFees>> {
        let last_withdrawal = self.last_fee_withdrawal(account);
        let mut result = Vec::new();
        for slot in (1..self.periods.len()).rev() {
            let period = &self.periods[slot];
            if period.fee_period_id == 0 {
                continue;
            }
            if period.fee_period_id <= last_withdrawal {
                result.push(PeriodFees {
                    fee_period_id: period.fee_period_id,
                    fees: Decimal::ZERO,
                    rewards: Decimal::ZERO,
                });
                continue;
            }
            let share = self.share_for_slot(account, slot, ledger)?;
            let fees = DebtLedger::apply_share(share, period.fees_to_distribute)?;
            let rewards = DebtLedger::apply_share(share, period.rewards_to_distribute)?;
            result.push(PeriodFees {
                fee_period_id: period.fee_period_id,
                fees: fees.min(period.fees_remaining()),
                rewards: rewards.min(period.rewards_remaining()),
            });
        }
        Ok(result)
    }

    /// Total `(fees, rewards)` claimable by `account`.
    pub fn fees_available(&self, account: &AccountId, ledger: &DebtLedger) -> SynthResult<(Decimal, Decimal)> {
        self.fees_by_period(account, ledger)?
            .iter()
            .try_fold((Decimal::ZERO, Decimal::ZERO), |(fees, rewards), p| {
                Some((fees.checked_add(p.fees)?, rewards.checked_add(p.rewards)?))
            })
            .or_overflow()
    }

    /// Highest collateralisation ratio at which fees can still be claimed.
    pub fn claim_threshold(&self, issuance_ratio: Decimal) -> SynthResult<Decimal> {
        issuance_ratio
            .checked_mul(Decimal::ONE.saturating_add(self.target_threshold))
            .or_overflow()
    }

    pub fn ensure_fees_claimable(&self, ratio: Decimal, issuance_ratio: Decimal) -> SynthResult<()> {
        let threshold = self.claim_threshold(issuance_ratio)?;
        if ratio > threshold {
            return Err(SynthError::FeesNotClaimable { ratio, threshold });
        }
        Ok(())
    }

    /// Work out what a claim by `account` would pay. Nothing is marked claimed.
    pub fn plan_claim(&self, account: &AccountId, ledger: &DebtLedger) -> SynthResult<FeeClaim> {
        let periods: Vec<PeriodFees> = self
            .fees_by_period(account, ledger)?
            .into_iter()
            .filter(|p| !p.fees.is_zero() || !p.rewards.is_zero())
            .collect();
        if periods.is_empty() {
            return Err(SynthError::NoFeesAvailable(account.clone()));
        }
        let (fees, rewards) = periods
            .iter()
            .try_fold((Decimal::ZERO, Decimal::ZERO), |(fees, rewards), p| {
                Some((fees.checked_add(p.fees)?, rewards.checked_add(p.rewards)?))
            })
            .or_overflow()?;
        Ok(FeeClaim {
            account: account.clone(),
            fees,
            rewards,
            periods,
            last_fee_withdrawal: self.periods[1].fee_period_id,
        })
    }

    /// Mark a planned claim as paid.
    pub fn apply_claim(&mut self, claim: &FeeClaim) {
        for paid in &claim.periods {
            if let Some(period) = self
                .periods
                .iter_mut()
                .find(|p| p.fee_period_id == paid.fee_period_id)
            {
                period.fees_claimed = period.fees_claimed.saturating_add(paid.fees);
                period.rewards_claimed = period.rewards_claimed.saturating_add(paid.rewards);
            }
        }
        self.last_fee_withdrawal
            .insert(claim.account.clone(), claim.last_fee_withdrawal);
        tracing::info!(
            account = %claim.account,
            fees = %claim.fees,
            rewards = %claim.rewards,
            last_fee_withdrawal = claim.last_fee_withdrawal,
            "Fees claimed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_700_000_000;
    const WEEK: u64 = 7 * 24 * 60 * 60;

    fn pool() -> FeePool {
        FeePool::new(&EngineConfig::default(), NOW)
    }

    fn d(n: u64) -> Decimal {
        Decimal::from_int(n)
    }

    #[test]
    fn test_initial_ring() {
        let pool = pool();
        let periods = pool.recent_fee_periods();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].fee_period_id, 1);
        assert_eq!(periods[0].start_time, NOW);
        assert_eq!(periods[1].fee_period_id, 0);
    }

    #[test]
    fn test_close_requires_duration() {
        let mut pool = pool();
        assert_eq!(
            pool.close_current_fee_period(NOW + WEEK - 10, 0),
            Err(SynthError::FeePeriodNotElapsed { secs_left: 10 })
        );
        let closed = pool.close_current_fee_period(NOW + WEEK, 3).unwrap();
        assert_eq!(closed.closed.fee_period_id, 1);
        assert_eq!(closed.opened.fee_period_id, 2);
        assert_eq!(closed.opened.starting_debt_index, 3);
        assert!(closed.evicted.is_none());
    }

    #[test]
    fn test_eviction_forfeits_unclaimed() {
        let mut pool = pool();
        pool.record_fee(d(10), FeeKind::Fees).unwrap();
        pool.record_fee(d(4), FeeKind::Rewards).unwrap();
        let closed = pool.close_current_fee_period(NOW + WEEK, 0).unwrap();
        assert!(closed.evicted.is_none());
        assert_eq!(closed.closed.fees_to_distribute, d(10));
        assert_eq!(pool.outstanding_rewards(), d(4));

        // Period 1 falls out of a ring of two on the next close
        let closed = pool.close_current_fee_period(NOW + 2 * WEEK, 0).unwrap();
        assert_eq!(closed.evicted.map(|p| p.fee_period_id), Some(1));
        assert_eq!(closed.forfeited_fees, d(10));
        assert_eq!(closed.forfeited_rewards, d(4));
        assert_eq!(pool.outstanding_rewards(), Decimal::ZERO);
    }

    #[test]
    fn test_fee_policy_multipliers() {
        let mut pool = pool();
        let eth = AssetId::from("sETH");
        let rate = pool
            .exchange_fee_rate_for(&eth, AssetClass::Standard, AssetClass::Standard)
            .unwrap();
        assert_eq!(rate, "0.003".parse().unwrap());
        let rate = pool
            .exchange_fee_rate_for(&eth, AssetClass::Standard, AssetClass::Inverse)
            .unwrap();
        assert_eq!(rate, "0.006".parse().unwrap());

        pool.set_exchange_fee_rate_for_synth(&eth, "0.01".parse().unwrap()).unwrap();
        pool.set_fee_class_multiplier(AssetClass::Inverse, AssetClass::Standard, d(3))
            .unwrap();
        let rate = pool
            .exchange_fee_rate_for(&eth, AssetClass::Inverse, AssetClass::Standard)
            .unwrap();
        assert_eq!(rate, "0.03".parse().unwrap());

        assert!(pool.set_exchange_fee_rate("0.2".parse().unwrap()).is_err());
        assert!(
            pool.set_fee_class_multiplier(AssetClass::Standard, AssetClass::Standard, d(11))
                .is_err()
        );
    }

    #[test]
    fn test_history_collapses_within_open_period() {
        let mut pool = pool();
        let alice = AccountId::from("alice");
        pool.append_account_issuance_record(&alice, PreciseDecimal::ONE, 0);
        pool.append_account_issuance_record(&alice, PreciseDecimal::ONE, 1);
        assert_eq!(pool.issuance_history(&alice).len(), 1);

        pool.close_current_fee_period(NOW + WEEK, 2).unwrap();
        pool.append_account_issuance_record(&alice, PreciseDecimal::ONE, 2);
        let history = pool.issuance_history(&alice);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].ledger_index, 2);
        assert_eq!(
            pool.applicable_issuance_data(&alice, 1).map(|r| r.ledger_index),
            Some(1)
        );
    }

    #[test]
    fn test_claim_pays_share_once() {
        let mut pool = pool();
        let mut ledger = DebtLedger::new();
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");

        // Alice then Bob each issue 100
        ledger.append(Decimal::ZERO, d(100)).unwrap();
        pool.append_account_issuance_record(&alice, PreciseDecimal::ONE, 0);
        ledger.append(d(100), d(200)).unwrap();
        pool.append_account_issuance_record(&bob, PreciseDecimal::from_raw(PreciseDecimal::UNIT / 2), 1);

        pool.record_fee(d(10), FeeKind::Fees).unwrap();
        assert_eq!(pool.fees_available(&alice, &ledger).unwrap(), (Decimal::ZERO, Decimal::ZERO));

        pool.close_current_fee_period(NOW + WEEK, ledger.len()).unwrap();
        assert_eq!(pool.fees_available(&alice, &ledger).unwrap(), (d(5), Decimal::ZERO));
        assert_eq!(pool.fees_available(&bob, &ledger).unwrap(), (d(5), Decimal::ZERO));

        let claim = pool.plan_claim(&alice, &ledger).unwrap();
        assert_eq!(claim.fees, d(5));
        assert_eq!(claim.last_fee_withdrawal, 1);
        pool.apply_claim(&claim);
        assert_eq!(pool.recent_fee_periods()[1].fees_claimed, d(5));
        assert_eq!(
            pool.plan_claim(&alice, &ledger),
            Err(SynthError::NoFeesAvailable(alice.clone()))
        );
        // Bob is unaffected
        assert_eq!(pool.fees_available(&bob, &ledger).unwrap().0, d(5));
    }

    #[test]
    fn test_claim_threshold() {
        let pool = pool();
        let issuance: Decimal = "0.125".parse().unwrap();
        // 0.125 * 1.01
        assert_eq!(pool.claim_threshold(issuance).unwrap(), "0.12625".parse().unwrap());
        assert!(pool.ensure_fees_claimable("0.12625".parse().unwrap(), issuance).is_ok());
        assert!(matches!(
            pool.ensure_fees_claimable("0.13".parse().unwrap(), issuance),
            Err(SynthError::FeesNotClaimable { .. })
        ));
    }
}
