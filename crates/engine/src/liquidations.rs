//! Liquidation state machine.
//!
//! An undercollateralised account is first flagged, which starts a delay
//! during which its owner can repair the ratio. Once the deadline passes and
//! the ratio is still at or above the liquidation ratio, anyone holding the
//! base synth can burn debt on its behalf in exchange for collateral at a
//! penalty discount.

use std::collections::HashMap;

use serde::Serialize;

use synth_common::config::{self, EngineConfig};
use synth_common::error::OrOverflow;
use synth_common::{AccountId, Decimal, SynthError, SynthResult, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationEntry {
    pub deadline: Timestamp,
    pub flagged_by: Option<AccountId>,
}

pub struct Liquidations {
    entries: HashMap<AccountId, LiquidationEntry>,
    liquidation_ratio: Decimal,
    liquidation_penalty: Decimal,
    liquidation_delay_secs: u64,
}

impl Liquidations {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            entries: HashMap::new(),
            liquidation_ratio: config.liquidation_ratio,
            liquidation_penalty: config.liquidation_penalty,
            liquidation_delay_secs: config.liquidation_delay_secs,
        }
    }

    pub fn liquidation_ratio(&self) -> Decimal {
        self.liquidation_ratio
    }

    pub fn liquidation_penalty(&self) -> Decimal {
        self.liquidation_penalty
    }

    pub fn liquidation_delay_secs(&self) -> u64 {
        self.liquidation_delay_secs
    }

    pub fn set_liquidation_ratio(&mut self, ratio: Decimal, issuance_ratio: Decimal) -> SynthResult<()> {
        config::validate_liquidation_ratio(ratio, issuance_ratio, self.liquidation_penalty)?;
        self.liquidation_ratio = ratio;
        tracing::info!(ratio = %ratio, "Liquidation ratio set");
        Ok(())
    }

    pub fn set_liquidation_penalty(&mut self, penalty: Decimal) -> SynthResult<()> {
        config::validate_liquidation_penalty(penalty)?;
        self.liquidation_penalty = penalty;
        tracing::info!(penalty = %penalty, "Liquidation penalty set");
        Ok(())
    }

    pub fn set_liquidation_delay(&mut self, secs: u64) -> SynthResult<()> {
        config::validate_liquidation_delay(secs)?;
        self.liquidation_delay_secs = secs;
        tracing::info!(secs, "Liquidation delay set");
        Ok(())
    }

    pub fn entry(&self, account: &AccountId) -> Option<&LiquidationEntry> {
        self.entries.get(account)
    }

    pub fn is_flagged(&self, account: &AccountId) -> bool {
        self.entries.contains_key(account)
    }

    pub fn flagged_count(&self) -> usize {
        self.entries.len()
    }

    /// Flag `account` given its current collateralisation ratio.
    pub fn flag_account(
        &mut self,
        account: &AccountId,
        flagged_by: Option<&AccountId>,
        ratio: Decimal,
        now: Timestamp,
    ) -> SynthResult<LiquidationEntry> {
        if self.is_flagged(account) {
            return Err(SynthError::AlreadyFlagged(account.clone()));
        }
        if ratio < self.liquidation_ratio {
            return Err(SynthError::NotEligibleForLiquidation(account.clone()));
        }
        let entry = LiquidationEntry {
            deadline: now.saturating_add(self.liquidation_delay_secs),
            flagged_by: flagged_by.cloned(),
        };
        self.entries.insert(account.clone(), entry.clone());
        tracing::info!(
            account = %account,
            ratio = %ratio,
            deadline = entry.deadline,
            "Account flagged for liquidation"
        );
        Ok(entry)
    }

    pub fn is_liquidation_deadline_passed(&self, account: &AccountId, now: Timestamp) -> bool {
        self.entries
            .get(account)
            .is_some_and(|entry| now > entry.deadline)
    }

    pub fn is_open_for_liquidation(&self, account: &AccountId, ratio: Decimal, now: Timestamp) -> bool {
        self.is_liquidation_deadline_passed(account, now) && ratio >= self.liquidation_ratio
    }

    /// Fail unless `account` can be liquidated right now.
    pub fn ensure_open_for_liquidation(
        &self,
        account: &AccountId,
        ratio: Decimal,
        now: Timestamp,
    ) -> SynthResult<()> {
        match self.entries.get(account) {
            None => Err(SynthError::NotEligibleForLiquidation(account.clone())),
            Some(entry) if now <= entry.deadline => Err(SynthError::DeadlineNotPassed {
                account: account.clone(),
                deadline: entry.deadline,
            }),
            Some(_) if ratio < self.liquidation_ratio => {
                Err(SynthError::NotEligibleForLiquidation(account.clone()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Remove the flag if the ratio has been restored. Returns whether it was removed.
    pub fn check_and_remove(&mut self, account: &AccountId, ratio: Decimal) -> SynthResult<bool> {
        if !self.is_flagged(account) {
            return Err(SynthError::NoLiquidationSet(account.clone()));
        }
        if ratio < self.liquidation_ratio {
            self.remove(account);
            return Ok(true);
        }
        tracing::debug!(account = %account, ratio = %ratio, "Account still below collateral target");
        Ok(false)
    }

    pub fn remove(&mut self, account: &AccountId) -> Option<LiquidationEntry> {
        let removed = self.entries.remove(account);
        if removed.is_some() {
            tracing::info!(account = %account, "Account removed from liquidation");
        }
        removed
    }

    /// Debt to burn so that, after paying out collateral at the penalty, the
    /// account lands exactly on `target_ratio`:
    ///
    /// `(debt - target * collateral) / (1 - target * (1 + penalty))`
    ///
    /// Both values are in the same currency. Zero when already at or under target.
    pub fn calculate_amount_to_fix_collateral(
        &self,
        debt: Decimal,
        collateral_value: Decimal,
        target_ratio: Decimal,
    ) -> SynthResult<Decimal> {
        let covered = target_ratio.checked_mul(collateral_value).or_overflow()?;
        if debt <= covered {
            return Ok(Decimal::ZERO);
        }
        let scaled_target = target_ratio
            .checked_mul(Decimal::ONE.saturating_add(self.liquidation_penalty))
            .or_overflow()?;
        let divisor = Decimal::ONE
            .checked_sub(scaled_target)
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                SynthError::Validation(format!(
                    "target ratio {} with penalty {} leaves no solution",
                    target_ratio, self.liquidation_penalty
                ))
            })?;
        debt.saturating_sub(covered).checked_div(divisor).or_overflow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_700_000_000;
    const DAY: u64 = 24 * 60 * 60;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn liquidations() -> Liquidations {
        Liquidations::new(&EngineConfig::default())
    }

    #[test]
    fn test_flag_requires_ratio() {
        let mut l = liquidations();
        let alice = AccountId::from("alice");
        assert_eq!(
            l.flag_account(&alice, None, dec("0.49"), NOW),
            Err(SynthError::NotEligibleForLiquidation(alice.clone()))
        );
        let entry = l.flag_account(&alice, None, dec("0.5"), NOW).unwrap();
        assert_eq!(entry.deadline, NOW + 3 * DAY);
        assert_eq!(
            l.flag_account(&alice, None, dec("0.6"), NOW),
            Err(SynthError::AlreadyFlagged(alice))
        );
    }

    #[test]
    fn test_deadline_is_strict() {
        let mut l = liquidations();
        let alice = AccountId::from("alice");
        l.flag_account(&alice, None, dec("0.6"), NOW).unwrap();
        let deadline = NOW + 3 * DAY;
        assert!(!l.is_liquidation_deadline_passed(&alice, deadline));
        assert!(l.is_liquidation_deadline_passed(&alice, deadline + 1));
        assert_eq!(
            l.ensure_open_for_liquidation(&alice, dec("0.6"), deadline),
            Err(SynthError::DeadlineNotPassed {
                account: alice.clone(),
                deadline,
            })
        );
        assert!(l.is_open_for_liquidation(&alice, dec("0.6"), deadline + 1));
        assert!(!l.is_open_for_liquidation(&alice, dec("0.4"), deadline + 1));
    }

    #[test]
    fn test_check_and_remove() {
        let mut l = liquidations();
        let alice = AccountId::from("alice");
        assert_eq!(
            l.check_and_remove(&alice, dec("0.1")),
            Err(SynthError::NoLiquidationSet(alice.clone()))
        );
        l.flag_account(&alice, None, dec("0.6"), NOW).unwrap();
        assert_eq!(l.check_and_remove(&alice, dec("0.55")), Ok(false));
        assert_eq!(l.check_and_remove(&alice, dec("0.3")), Ok(true));
        assert!(!l.is_flagged(&alice));
    }

    #[test]
    fn test_amount_to_fix_lands_on_target() {
        let l = liquidations();
        let target = dec("0.2");
        // debt 80, collateral 100, penalty 10%: (80 - 20) / (1 - 0.22)
        let x = l
            .calculate_amount_to_fix_collateral(Decimal::from_int(80), Decimal::from_int(100), target)
            .unwrap();
        let debt_after = Decimal::from_int(80).saturating_sub(x);
        let collateral_after = Decimal::from_int(100)
            .saturating_sub(x.checked_mul(dec("1.1")).unwrap());
        let ratio = debt_after.checked_div(collateral_after).unwrap();
        assert!(ratio.abs_diff(target) < dec("0.000000000001"));

        assert_eq!(
            l.calculate_amount_to_fix_collateral(Decimal::from_int(20), Decimal::from_int(100), target)
                .unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_setting_bounds() {
        let mut l = liquidations();
        assert!(l.set_liquidation_delay(DAY - 1).is_err());
        assert!(l.set_liquidation_delay(DAY).is_ok());
        assert!(l.set_liquidation_penalty(dec("0.3")).is_err());
        assert!(l.set_liquidation_ratio(dec("0.1"), dec("0.125")).is_err());
        assert!(l.set_liquidation_ratio(dec("0.8"), dec("0.125")).is_ok());
    }
}
