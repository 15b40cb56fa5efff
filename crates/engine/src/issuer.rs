//! Issuer: mints and burns debt against locked collateral.
//!
//! Every mint or burn moves the total system debt and appends one entry to the
//! [`DebtLedger`]. The caller's [`IssuanceData`] is rewritten to its new share
//! of the pool at that entry; everybody else's share is diluted (or
//! concentrated) implicitly by the entry itself.

use std::collections::HashMap;

use serde::Serialize;

use synth_common::config::EngineConfig;
use synth_common::error::OrOverflow;
use synth_common::{
    AccountId, AssetClass, AssetId, Decimal, PreciseDecimal, SynthError, SynthResult, Timestamp,
};
use synth_oracle::ExchangeRates;

use crate::balances::{Balances, CollateralEscrow};
use crate::debt_ledger::DebtLedger;
use crate::exchanger::SettlementPlan;

/// An account's share of the debt pool as of a ledger entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssuanceData {
    pub initial_debt_ownership: PreciseDecimal,
    pub debt_entry_index: usize,
}

/// Result of a mint or burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtChange {
    pub account: AccountId,
    pub amount: Decimal,
    pub debt_before: Decimal,
    pub debt_after: Decimal,
    pub total_debt_after: Decimal,
    pub ledger_index: usize,
    pub record: IssuanceData,
}

/// A burn that has passed every check and can be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnPlan {
    pub debtor: AccountId,
    pub payer: AccountId,
    pub burned: Decimal,
    pub debt_before: Decimal,
    pub debt_after: Decimal,
    pub total_before: Decimal,
    pub total_after: Decimal,
    ownership: PreciseDecimal,
    ledger_entry: PreciseDecimal,
    new_epoch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemainingIssuable {
    pub max_issuable: Decimal,
    pub already_issued: Decimal,
    pub remaining: Decimal,
}

pub struct Issuer {
    base_asset: AssetId,
    collateral_asset: AssetId,
    synths: Vec<(AssetId, AssetClass)>,
    issuance_data: HashMap<AccountId, IssuanceData>,
    debt_ledger: DebtLedger,
    issuance_ratio: Decimal,
}

impl Issuer {
    /// Register the base synth and every synth named in the config.
    pub fn new(config: &EngineConfig) -> SynthResult<Self> {
        let mut issuer = Self {
            base_asset: config.base_asset.clone(),
            collateral_asset: config.collateral_asset.clone(),
            synths: vec![(config.base_asset.clone(), AssetClass::Standard)],
            issuance_data: HashMap::new(),
            debt_ledger: DebtLedger::new(),
            issuance_ratio: config.issuance_ratio,
        };
        for (asset, class) in &config.synths {
            issuer.add_synth(asset, *class)?;
        }
        Ok(issuer)
    }

    pub fn base_asset(&self) -> &AssetId {
        &self.base_asset
    }

    pub fn collateral_asset(&self) -> &AssetId {
        &self.collateral_asset
    }

    pub fn issuance_ratio(&self) -> Decimal {
        self.issuance_ratio
    }

    pub fn set_issuance_ratio(&mut self, ratio: Decimal) {
        self.issuance_ratio = ratio;
        tracing::info!(ratio = %ratio, "Issuance ratio set");
    }

    pub fn debt_ledger(&self) -> &DebtLedger {
        &self.debt_ledger
    }

    pub fn issuance_data(&self, account: &AccountId) -> Option<IssuanceData> {
        self.issuance_data.get(account).copied()
    }

    // ============================================================
    // Synth registry
    // ============================================================

    pub fn synths(&self) -> &[(AssetId, AssetClass)] {
        &self.synths
    }

    pub fn synth_keys(&self) -> impl Iterator<Item = &AssetId> {
        self.synths.iter().map(|(asset, _)| asset)
    }

    pub fn asset_class(&self, asset: &AssetId) -> Option<AssetClass> {
        self.synths
            .iter()
            .find(|(key, _)| key == asset)
            .map(|(_, class)| *class)
    }

    /// Class of a registered synth, or `UnknownAsset`.
    pub fn ensure_synth(&self, asset: &AssetId) -> SynthResult<AssetClass> {
        self.asset_class(asset)
            .ok_or_else(|| SynthError::UnknownAsset(asset.clone()))
    }

    pub fn add_synth(&mut self, asset: &AssetId, class: AssetClass) -> SynthResult<()> {
        if *asset == self.collateral_asset {
            return Err(SynthError::Validation(format!(
                "collateral asset {} cannot be a synth",
                asset
            )));
        }
        if self.asset_class(asset).is_some() {
            return Err(SynthError::Validation(format!("synth {} already exists", asset)));
        }
        self.synths.push((asset.clone(), class));
        tracing::info!(asset = %asset, class = %class, "Synth added");
        Ok(())
    }

    /// Remove a synth with no supply outstanding.
    pub fn remove_synth<B: Balances>(&mut self, asset: &AssetId, balances: &B) -> SynthResult<AssetClass> {
        if *asset == self.base_asset {
            return Err(SynthError::Validation(format!(
                "base synth {} cannot be removed",
                asset
            )));
        }
        let class = self.ensure_synth(asset)?;
        let supply = balances.total_supply(asset);
        if !supply.is_zero() {
            return Err(SynthError::Validation(format!(
                "synth {} still has {} in circulation",
                asset, supply
            )));
        }
        self.synths.retain(|(key, _)| key != asset);
        tracing::info!(asset = %asset, "Synth removed");
        Ok(class)
    }

    // ============================================================
    // Views
    // ============================================================

    /// Fail if the collateral rate or any synth rate is stale.
    pub fn ensure_rates_fresh(&self, rates: &ExchangeRates, now: Timestamp) -> SynthResult<()> {
        rates.ensure_fresh(
            std::iter::once(&self.collateral_asset).chain(self.synth_keys()),
            now,
        )
    }

    /// Value of every synth in circulation, expressed in `currency`.
    pub fn total_issued_synths<B: Balances>(
        &self,
        currency: &AssetId,
        rates: &ExchangeRates,
        balances: &B,
    ) -> SynthResult<Decimal> {
        let mut total = Decimal::ZERO;
        for synth in self.synth_keys() {
            let supply = balances.total_supply(synth);
            if supply.is_zero() {
                continue;
            }
            let value = rates.effective_value(synth, supply, currency)?;
            total = total.checked_add(value).or_overflow()?;
        }
        Ok(total)
    }

    /// Share of the pool currently owned by `account`.
    pub fn debt_share_of(&self, account: &AccountId) -> SynthResult<PreciseDecimal> {
        match self.issuance_data.get(account) {
            Some(data) => self
                .debt_ledger
                .current_share(data.initial_debt_ownership, data.debt_entry_index),
            None => Ok(PreciseDecimal::ZERO),
        }
    }

    /// Debt of `account` expressed in `currency`.
    pub fn debt_balance_of<B: Balances>(
        &self,
        account: &AccountId,
        currency: &AssetId,
        rates: &ExchangeRates,
        balances: &B,
    ) -> SynthResult<Decimal> {
        let share = self.debt_share_of(account)?;
        if share.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let total = self.total_issued_synths(currency, rates, balances)?;
        DebtLedger::apply_share(share, total)
    }

    /// Free plus escrowed collateral.
    pub fn collateral<B: Balances, E: CollateralEscrow>(
        &self,
        account: &AccountId,
        balances: &B,
        escrow: &E,
    ) -> SynthResult<Decimal> {
        balances
            .balance_of(&self.collateral_asset, account)
            .checked_add(escrow.escrowed_balance(account))
            .or_overflow()
    }

    /// Collateral of `account` valued in the base asset.
    pub fn collateral_value<B: Balances, E: CollateralEscrow>(
        &self,
        account: &AccountId,
        rates: &ExchangeRates,
        balances: &B,
        escrow: &E,
    ) -> SynthResult<Decimal> {
        let collateral = self.collateral(account, balances, escrow)?;
        rates.effective_value(&self.collateral_asset, collateral, &self.base_asset)
    }

    pub fn max_issuable_synths<B: Balances, E: CollateralEscrow>(
        &self,
        account: &AccountId,
        rates: &ExchangeRates,
        balances: &B,
        escrow: &E,
    ) -> SynthResult<Decimal> {
        self.collateral_value(account, rates, balances, escrow)?
            .checked_mul(self.issuance_ratio)
            .or_overflow()
    }

    pub fn remaining_issuable_synths<B: Balances, E: CollateralEscrow>(
        &self,
        account: &AccountId,
        rates: &ExchangeRates,
        balances: &B,
        escrow: &E,
    ) -> SynthResult<RemainingIssuable> {
        let max_issuable = self.max_issuable_synths(account, rates, balances, escrow)?;
        let already_issued = self.debt_balance_of(account, &self.base_asset, rates, balances)?;
        Ok(RemainingIssuable {
            max_issuable,
            already_issued,
            remaining: max_issuable.saturating_sub(already_issued),
        })
    }

    /// Debt value over collateral value. Zero without collateral.
    pub fn collateralisation_ratio<B: Balances, E: CollateralEscrow>(
        &self,
        account: &AccountId,
        rates: &ExchangeRates,
        balances: &B,
        escrow: &E,
    ) -> SynthResult<Decimal> {
        let collateral_value = self.collateral_value(account, rates, balances, escrow)?;
        if collateral_value.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let debt = self.debt_balance_of(account, &self.base_asset, rates, balances)?;
        debt.checked_div(collateral_value).or_overflow()
    }

    // ============================================================
    // Mint / burn
    // ============================================================

    /// Mint `amount` of the base synth to `account` against its collateral.
    pub fn issue<B: Balances, E: CollateralEscrow>(
        &mut self,
        account: &AccountId,
        amount: Decimal,
        rates: &ExchangeRates,
        balances: &mut B,
        escrow: &E,
        now: Timestamp,
    ) -> SynthResult<DebtChange> {
        if amount.is_zero() {
            return Err(SynthError::InvalidAmount(
                "issue amount must be greater than zero".to_string(),
            ));
        }
        self.ensure_rates_fresh(rates, now)?;

        let remaining = self.remaining_issuable_synths(account, rates, &*balances, escrow)?;
        if amount > remaining.remaining {
            return Err(SynthError::ExceedsMaxIssuable {
                requested: amount,
                remaining: remaining.remaining,
            });
        }

        let total_before = self.total_issued_synths(&self.base_asset, rates, &*balances)?;
        let total_after = total_before.checked_add(amount).or_overflow()?;
        let debt_before = remaining.already_issued;
        let debt_after = debt_before.checked_add(amount).or_overflow()?;
        let ownership = DebtLedger::ownership_of(debt_after, total_after)?;

        let ledger_index = self.debt_ledger.append(total_before, total_after)?;
        let record = IssuanceData {
            initial_debt_ownership: ownership,
            debt_entry_index: ledger_index,
        };
        self.issuance_data.insert(account.clone(), record);
        balances.mint(&self.base_asset, account, amount)?;

        tracing::info!(
            account = %account,
            amount = %amount,
            debt = %debt_after,
            total_debt = %total_after,
            ledger_index,
            "Synths issued"
        );

        Ok(DebtChange {
            account: account.clone(),
            amount,
            debt_before,
            debt_after,
            total_debt_after: total_after,
            ledger_index,
            record,
        })
    }

    /// Burn up to `amount` of `payer`'s base synth against `debtor`'s debt.
    ///
    /// The amount actually burned is capped at the debtor's debt.
    pub fn burn<B: Balances>(
        &mut self,
        debtor: &AccountId,
        payer: &AccountId,
        amount: Decimal,
        rates: &ExchangeRates,
        balances: &mut B,
        now: Timestamp,
    ) -> SynthResult<DebtChange> {
        let plan = self.plan_burn(debtor, payer, amount, None, rates, &*balances, now)?;
        self.apply_burn(plan, balances)
    }

    /// Validate a burn without touching any state.
    ///
    /// `pending` is a settlement of the payer's base synth that will be
    /// applied right before the burn. Its reclaim and rebate are folded into
    /// the payer's balance and the total debt the burn is planned against.
    pub fn plan_burn<B: Balances>(
        &self,
        debtor: &AccountId,
        payer: &AccountId,
        amount: Decimal,
        pending: Option<&SettlementPlan>,
        rates: &ExchangeRates,
        balances: &B,
        now: Timestamp,
    ) -> SynthResult<BurnPlan> {
        if amount.is_zero() {
            return Err(SynthError::InvalidAmount(
                "burn amount must be greater than zero".to_string(),
            ));
        }
        self.ensure_rates_fresh(rates, now)?;

        let mut total_before = self.total_issued_synths(&self.base_asset, rates, balances)?;
        let mut available = balances.balance_of(&self.base_asset, payer);
        if let Some(settlement) = pending.filter(|p| p.asset == self.base_asset && &p.account == payer) {
            total_before = total_before
                .saturating_sub(settlement.reclaim)
                .checked_add(settlement.rebate)
                .or_overflow()?;
            available = available
                .saturating_sub(settlement.reclaim)
                .checked_add(settlement.rebate)
                .or_overflow()?;
        }

        let share = self.debt_share_of(debtor)?;
        let debt_before = DebtLedger::apply_share(share, total_before)?;
        if debt_before.is_zero() {
            return Err(SynthError::InsufficientDebt(debtor.clone()));
        }
        let burned = amount.min(debt_before);
        if available < burned {
            return Err(SynthError::InsufficientBalance {
                asset: self.base_asset.clone(),
                requested: burned,
                available,
            });
        }

        let total_after = total_before.saturating_sub(burned);
        let debt_after = debt_before.saturating_sub(burned);
        let ownership = if debt_after.is_zero() {
            PreciseDecimal::ZERO
        } else {
            DebtLedger::ownership_of(debt_after, total_after)?
        };
        let (ledger_entry, new_epoch) = self.debt_ledger.next_entry(total_before, total_after)?;

        Ok(BurnPlan {
            debtor: debtor.clone(),
            payer: payer.clone(),
            burned,
            debt_before,
            debt_after,
            total_before,
            total_after,
            ownership,
            ledger_entry,
            new_epoch,
        })
    }

    /// Apply a burn from [`plan_burn`](Self::plan_burn).
    pub fn apply_burn<B: Balances>(&mut self, plan: BurnPlan, balances: &mut B) -> SynthResult<DebtChange> {
        balances.burn(&self.base_asset, &plan.payer, plan.burned)?;
        let ledger_index = self.debt_ledger.push(plan.ledger_entry, plan.new_epoch);
        let record = if plan.debt_after.is_zero() {
            IssuanceData {
                initial_debt_ownership: PreciseDecimal::ZERO,
                debt_entry_index: self
                    .issuance_data
                    .get(&plan.debtor)
                    .map(|data| data.debt_entry_index)
                    .unwrap_or(ledger_index),
            }
        } else {
            IssuanceData {
                initial_debt_ownership: plan.ownership,
                debt_entry_index: ledger_index,
            }
        };
        self.issuance_data.insert(plan.debtor.clone(), record);

        tracing::info!(
            account = %plan.debtor,
            payer = %plan.payer,
            amount = %plan.burned,
            debt = %plan.debt_after,
            total_debt = %plan.total_after,
            ledger_index,
            new_epoch = plan.new_epoch,
            "Synths burned"
        );

        Ok(DebtChange {
            account: plan.debtor,
            amount: plan.burned,
            debt_before: plan.debt_before,
            debt_after: plan.debt_after,
            total_debt_after: plan.total_after,
            ledger_index,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::{InMemoryBalances, InMemoryEscrow};
    use synth_oracle::OracleSettings;

    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        issuer: Issuer,
        rates: ExchangeRates,
        balances: InMemoryBalances,
        escrow: InMemoryEscrow,
    }

    fn fixture(snx_price: &str) -> Fixture {
        let config = EngineConfig {
            synths: vec![(AssetId::from("sBTC"), AssetClass::Standard)],
            issuance_ratio: "0.2".parse().unwrap(),
            ..EngineConfig::default()
        };
        let mut rates = ExchangeRates::new(config.base_asset.clone(), OracleSettings::from(&config));
        rates
            .update_rates(
                &[AssetId::from("SNX"), AssetId::from("sBTC")],
                &[snx_price.parse().unwrap(), Decimal::from_int(20_000)],
                NOW,
                NOW,
            )
            .unwrap();
        Fixture {
            issuer: Issuer::new(&config).unwrap(),
            rates,
            balances: InMemoryBalances::new(),
            escrow: InMemoryEscrow::new(),
        }
    }

    fn fund(f: &mut Fixture, who: &str, snx: u64) -> AccountId {
        let account = AccountId::from(who);
        f.balances
            .mint(&AssetId::from("SNX"), &account, Decimal::from_int(snx))
            .unwrap();
        account
    }

    fn issue(f: &mut Fixture, account: &AccountId, amount: u64) -> SynthResult<DebtChange> {
        f.issuer.issue(
            account,
            Decimal::from_int(amount),
            &f.rates,
            &mut f.balances,
            &f.escrow,
            NOW,
        )
    }

    fn debt(f: &Fixture, account: &AccountId) -> Decimal {
        f.issuer
            .debt_balance_of(account, &AssetId::from("sUSD"), &f.rates, &f.balances)
            .unwrap()
    }

    #[test]
    fn test_registry() {
        let mut f = fixture("1");
        assert_eq!(f.issuer.synths().len(), 2);
        assert_eq!(f.issuer.asset_class(&AssetId::from("sUSD")), Some(AssetClass::Standard));
        assert!(f.issuer.add_synth(&AssetId::from("sBTC"), AssetClass::Standard).is_err());
        assert!(f.issuer.add_synth(&AssetId::from("SNX"), AssetClass::Standard).is_err());
        f.issuer.add_synth(&AssetId::from("iETH"), AssetClass::Inverse).unwrap();
        assert_eq!(
            f.issuer.remove_synth(&AssetId::from("iETH"), &f.balances).unwrap(),
            AssetClass::Inverse
        );
        assert!(f.issuer.remove_synth(&AssetId::from("sUSD"), &f.balances).is_err());
        assert!(matches!(
            f.issuer.ensure_synth(&AssetId::from("iETH")),
            Err(SynthError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_issue_up_to_max() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 600);
        assert_eq!(
            f.issuer
                .max_issuable_synths(&alice, &f.rates, &f.balances, &f.escrow)
                .unwrap(),
            Decimal::from_int(120)
        );

        let change = issue(&mut f, &alice, 100).unwrap();
        assert_eq!(change.debt_after, Decimal::from_int(100));
        assert_eq!(change.record.initial_debt_ownership, PreciseDecimal::ONE);

        let err = issue(&mut f, &alice, 21).unwrap_err();
        assert_eq!(
            err,
            SynthError::ExceedsMaxIssuable {
                requested: Decimal::from_int(21),
                remaining: Decimal::from_int(20),
            }
        );
        issue(&mut f, &alice, 20).unwrap();
        assert_eq!(debt(&f, &alice), Decimal::from_int(120));
    }

    #[test]
    fn test_second_issuer_dilutes_first() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        let bob = fund(&mut f, "bob", 1_000);
        issue(&mut f, &alice, 100).unwrap();
        issue(&mut f, &bob, 100).unwrap();

        assert_eq!(debt(&f, &alice), Decimal::from_int(100));
        assert_eq!(debt(&f, &bob), Decimal::from_int(100));
        let share = f.issuer.debt_share_of(&alice).unwrap();
        assert_eq!(share.raw(), PreciseDecimal::UNIT / 2);
    }

    #[test]
    fn test_price_move_is_shared_pro_rata() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        let bob = fund(&mut f, "bob", 1_000);
        issue(&mut f, &alice, 100).unwrap();
        issue(&mut f, &bob, 100).unwrap();

        // Alice moves her sUSD into sBTC; the sBTC price then doubles
        let usd = AssetId::from("sUSD");
        let btc = AssetId::from("sBTC");
        f.balances.burn(&usd, &alice, Decimal::from_int(100)).unwrap();
        f.balances.mint(&btc, &alice, "0.005".parse().unwrap()).unwrap();
        f.rates
            .update_rates(&[btc], &[Decimal::from_int(40_000)], NOW + 1, NOW + 1)
            .unwrap();

        // Total is now 100 sUSD + 200 worth of sBTC, split evenly
        assert_eq!(debt(&f, &alice), Decimal::from_int(150));
        assert_eq!(debt(&f, &bob), Decimal::from_int(150));
    }

    #[test]
    fn test_burn_caps_at_debt_and_resets_ownership() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        let bob = fund(&mut f, "bob", 1_000);
        issue(&mut f, &alice, 100).unwrap();
        issue(&mut f, &bob, 100).unwrap();
        f.balances
            .transfer(&AssetId::from("sUSD"), &bob, &alice, Decimal::from_int(50))
            .unwrap();
        // Pool is 200 and alice owns half of it
        assert_eq!(debt(&f, &alice), Decimal::from_int(100));

        let change = f
            .issuer
            .burn(&alice, &alice, Decimal::from_int(150), &f.rates, &mut f.balances, NOW)
            .unwrap();
        assert_eq!(change.amount, Decimal::from_int(100));
        assert_eq!(change.record.initial_debt_ownership, PreciseDecimal::ZERO);
        assert_eq!(change.record.debt_entry_index, 0);
        assert_eq!(debt(&f, &alice), Decimal::ZERO);

        let err = f
            .issuer
            .burn(&alice, &alice, Decimal::ONE, &f.rates, &mut f.balances, NOW)
            .unwrap_err();
        assert_eq!(err, SynthError::InsufficientDebt(alice));
    }

    #[test]
    fn test_full_burn_starts_new_epoch() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        issue(&mut f, &alice, 100).unwrap();
        f.issuer
            .burn(&alice, &alice, Decimal::from_int(100), &f.rates, &mut f.balances, NOW)
            .unwrap();
        assert_eq!(f.issuer.debt_ledger().epoch_starts(), &[0, 1]);

        issue(&mut f, &alice, 10).unwrap();
        assert_eq!(debt(&f, &alice), Decimal::from_int(10));
    }

    #[test]
    fn test_planned_burn_changes_nothing_until_applied() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        issue(&mut f, &alice, 100).unwrap();
        let usd = AssetId::from("sUSD");

        let plan = f
            .issuer
            .plan_burn(&alice, &alice, Decimal::from_int(40), None, &f.rates, &f.balances, NOW)
            .unwrap();
        assert_eq!(plan.burned, Decimal::from_int(40));
        assert_eq!(plan.total_after, Decimal::from_int(60));
        assert_eq!(f.issuer.debt_ledger().len(), 1);
        assert_eq!(f.balances.balance_of(&usd, &alice), Decimal::from_int(100));

        let change = f.issuer.apply_burn(plan, &mut f.balances).unwrap();
        assert_eq!(change.ledger_index, 1);
        assert_eq!(debt(&f, &alice), Decimal::from_int(60));
        assert_eq!(f.balances.balance_of(&usd, &alice), Decimal::from_int(60));
    }

    #[test]
    fn test_escrow_counts_as_collateral() {
        let mut f = fixture("2");
        let alice = fund(&mut f, "alice", 100);
        f.escrow.set_escrowed(&alice, Decimal::from_int(50));
        assert_eq!(
            f.issuer.collateral(&alice, &f.balances, &f.escrow).unwrap(),
            Decimal::from_int(150)
        );
        // 150 SNX at $2, 20%
        assert_eq!(
            f.issuer
                .max_issuable_synths(&alice, &f.rates, &f.balances, &f.escrow)
                .unwrap(),
            Decimal::from_int(60)
        );
    }

    #[test]
    fn test_stale_collateral_rate_blocks_issue() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        let err = f
            .issuer
            .issue(
                &alice,
                Decimal::ONE,
                &f.rates,
                &mut f.balances,
                &f.escrow,
                NOW + 3 * 60 * 60 + 1,
            )
            .unwrap_err();
        assert_eq!(err, SynthError::StaleRate(AssetId::from("SNX")));
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut f = fixture("1");
        let alice = fund(&mut f, "alice", 1_000);
        assert!(matches!(issue(&mut f, &alice, 0), Err(SynthError::InvalidAmount(_))));
    }
}
