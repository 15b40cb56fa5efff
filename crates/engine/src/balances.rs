//! Token balance and escrow collaborators.
//!
//! The engine never stores balances itself. It reads and moves them through
//! [`Balances`] and reads locked reward balances through [`CollateralEscrow`].
//! The in-memory implementations back the tests, the simulator and the benchmark.

use std::collections::HashMap;

use synth_common::error::OrOverflow;
use synth_common::{AccountId, AssetId, Decimal, SynthError, SynthResult};

/// Per-asset fungible balances.
pub trait Balances {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Decimal;

    fn total_supply(&self, asset: &AssetId) -> Decimal;

    fn mint(&mut self, asset: &AssetId, account: &AccountId, amount: Decimal) -> SynthResult<()>;

    fn burn(&mut self, asset: &AssetId, account: &AccountId, amount: Decimal) -> SynthResult<()>;

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> SynthResult<()>;
}

/// Collateral locked in reward escrow. It counts toward an account's
/// collateral but cannot be moved.
pub trait CollateralEscrow {
    fn escrowed_balance(&self, account: &AccountId) -> Decimal;
}

/// HashMap-backed balances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBalances {
    balances: HashMap<(AssetId, AccountId), Decimal>,
    supply: HashMap<AssetId, Decimal>,
}

impl InMemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-zero balances across all assets.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| !b.is_zero()).count()
    }

    fn ensure_balance(&self, asset: &AssetId, account: &AccountId, amount: Decimal) -> SynthResult<Decimal> {
        let available = self.balance_of(asset, account);
        if available < amount {
            return Err(SynthError::InsufficientBalance {
                asset: asset.clone(),
                requested: amount,
                available,
            });
        }
        Ok(available)
    }
}

impl Balances for InMemoryBalances {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> Decimal {
        self.balances
            .get(&(asset.clone(), account.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn total_supply(&self, asset: &AssetId) -> Decimal {
        self.supply.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    fn mint(&mut self, asset: &AssetId, account: &AccountId, amount: Decimal) -> SynthResult<()> {
        let supply = self.total_supply(asset).checked_add(amount).or_overflow()?;
        let balance = self
            .balance_of(asset, account)
            .checked_add(amount)
            .or_overflow()?;
        self.supply.insert(asset.clone(), supply);
        self.balances.insert((asset.clone(), account.clone()), balance);
        Ok(())
    }

    fn burn(&mut self, asset: &AssetId, account: &AccountId, amount: Decimal) -> SynthResult<()> {
        let available = self.ensure_balance(asset, account, amount)?;
        let supply = self.total_supply(asset).saturating_sub(amount);
        self.supply.insert(asset.clone(), supply);
        self.balances
            .insert((asset.clone(), account.clone()), available.saturating_sub(amount));
        Ok(())
    }

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> SynthResult<()> {
        let available = self.ensure_balance(asset, from, amount)?;
        if from == to {
            return Ok(());
        }
        let receiver = self.balance_of(asset, to).checked_add(amount).or_overflow()?;
        self.balances
            .insert((asset.clone(), from.clone()), available.saturating_sub(amount));
        self.balances.insert((asset.clone(), to.clone()), receiver);
        Ok(())
    }
}

/// HashMap-backed escrow.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEscrow {
    escrowed: HashMap<AccountId, Decimal>,
}

impl InMemoryEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_escrowed(&mut self, account: &AccountId, amount: Decimal) {
        if amount.is_zero() {
            self.escrowed.remove(account);
        } else {
            self.escrowed.insert(account.clone(), amount);
        }
    }
}

impl CollateralEscrow for InMemoryEscrow {
    fn escrowed_balance(&self, account: &AccountId) -> Decimal {
        self.escrowed.get(account).copied().unwrap_or(Decimal::ZERO)
    }
}
