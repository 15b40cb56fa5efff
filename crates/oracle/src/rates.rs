use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use synth_common::config::EngineConfig;
use synth_common::error::OrOverflow;
use synth_common::{AssetId, Decimal, SynthError, SynthResult, Timestamp};

use crate::inverse::InversePricing;

/// A single price observation for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateRound {
    pub round_id: u64,
    pub rate: Decimal,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default)]
struct AssetRates {
    /// `None` if never set or deleted.
    current: Option<RateRound>,
    /// Recent rounds, oldest first. Includes `current`.
    history: VecDeque<RateRound>,
    last_round_id: u64,
}

/// Oracle settings derived from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct OracleSettings {
    pub rate_stale_period_secs: u64,
    pub future_tolerance_secs: u64,
    pub history_len: usize,
}

impl From<&EngineConfig> for OracleSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            rate_stale_period_secs: config.rate_stale_period_secs,
            future_tolerance_secs: config.rate_future_tolerance_secs,
            history_len: config.rate_history_len.max(1),
        }
    }
}

/// Result of a `update_rates` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RatesUpdate {
    /// Rounds written, one per accepted asset, in call order.
    pub applied: Vec<(AssetId, RateRound)>,
    /// Assets skipped because the stored rate is newer than `time_sent`.
    pub skipped: Vec<AssetId>,
    /// Inverse assets that hit a limit during this update.
    pub frozen: Vec<AssetId>,
}

/// Last-known exchange rates per asset, with staleness tracking.
///
/// The base asset is pinned at a rate of 1 and is never stale.
#[derive(Debug, Clone)]
pub struct ExchangeRates {
    base_asset: AssetId,
    rates: HashMap<AssetId, AssetRates>,
    inverse_pricing: HashMap<AssetId, InversePricing>,
    default_stale_period_secs: u64,
    stale_period_overrides: HashMap<AssetId, u64>,
    future_tolerance_secs: u64,
    history_len: usize,
}

impl ExchangeRates {
    pub fn new(base_asset: AssetId, settings: OracleSettings) -> Self {
        Self {
            base_asset,
            rates: HashMap::new(),
            inverse_pricing: HashMap::new(),
            default_stale_period_secs: settings.rate_stale_period_secs,
            stale_period_overrides: HashMap::new(),
            future_tolerance_secs: settings.future_tolerance_secs,
            history_len: settings.history_len.max(1),
        }
    }

    pub fn base_asset(&self) -> &AssetId {
        &self.base_asset
    }

    /// Store new rates for `assets`, all timestamped `time_sent`.
    ///
    /// The whole call is rejected if the arrays differ in length, the timestamp
    /// is too far in the future, any rate is zero, or the base asset is included.
    /// Assets whose stored rate is newer than `time_sent` are skipped.
    pub fn update_rates(
        &mut self,
        assets: &[AssetId],
        rates: &[Decimal],
        time_sent: Timestamp,
        now: Timestamp,
    ) -> SynthResult<RatesUpdate> {
        if assets.len() != rates.len() {
            return Err(SynthError::Validation(format!(
                "currency keys ({}) and rates ({}) length mismatch",
                assets.len(),
                rates.len()
            )));
        }
        if time_sent > now.saturating_add(self.future_tolerance_secs) {
            tracing::warn!(time_sent, now, "Rejected rate update from the future");
            return Err(SynthError::FutureTimestamp { time_sent, now });
        }
        for (asset, rate) in assets.iter().zip(rates) {
            if *asset == self.base_asset {
                return Err(SynthError::Validation(format!(
                    "rate of {} cannot be updated, it is always 1",
                    asset
                )));
            }
            if rate.is_zero() {
                return Err(SynthError::InvalidAmount(format!(
                    "zero is not a valid rate for {}, delete the rate instead",
                    asset
                )));
            }
        }

        let mut update = RatesUpdate::default();
        for (asset, feed_rate) in assets.iter().zip(rates) {
            let entry = self.rates.entry(asset.clone()).or_default();
            let stored_newer = entry
                .current
                .filter(|current| time_sent < current.timestamp);
            if let Some(current) = stored_newer {
                tracing::debug!(
                    asset = %asset,
                    time_sent,
                    stored = current.timestamp,
                    "Skipping rate older than stored rate"
                );
                update.skipped.push(asset.clone());
                continue;
            }

            let mut rate = *feed_rate;
            if let Some(pricing) = self.inverse_pricing.get_mut(asset) {
                let (inverted, newly_frozen) = pricing.invert(rate);
                rate = inverted;
                if newly_frozen {
                    tracing::warn!(asset = %asset, rate = %rate, "Inverse rate frozen at limit");
                    update.frozen.push(asset.clone());
                }
            }

            entry.last_round_id += 1;
            let round = RateRound {
                round_id: entry.last_round_id,
                rate,
                timestamp: time_sent,
            };
            entry.current = Some(round);
            entry.history.push_back(round);
            while entry.history.len() > self.history_len {
                entry.history.pop_front();
            }
            update.applied.push((asset.clone(), round));
        }

        tracing::info!(
            applied = update.applied.len(),
            skipped = update.skipped.len(),
            time_sent,
            "Rates updated"
        );
        Ok(update)
    }

    /// Remove the current rate of an asset. History is kept.
    pub fn delete_rate(&mut self, asset: &AssetId) -> SynthResult<RateRound> {
        if *asset == self.base_asset {
            return Err(SynthError::Validation(format!(
                "rate of {} cannot be deleted",
                asset
            )));
        }
        let removed = self
            .rates
            .get_mut(asset)
            .and_then(|entry| entry.current.take())
            .ok_or_else(|| SynthError::Validation(format!("rate for {} is not set", asset)))?;
        tracing::info!(asset = %asset, round_id = removed.round_id, "Rate deleted");
        Ok(removed)
    }

    /// Last known rate; 1 for the base asset, 0 if never set.
    pub fn rate_for_currency(&self, asset: &AssetId) -> Decimal {
        if *asset == self.base_asset {
            return Decimal::ONE;
        }
        self.current(asset).map(|r| r.rate).unwrap_or(Decimal::ZERO)
    }

    pub fn rates_for_currencies(&self, assets: &[AssetId]) -> Vec<Decimal> {
        assets.iter().map(|a| self.rate_for_currency(a)).collect()
    }

    /// Rate and the time it was reported. The base asset reports `now`.
    pub fn rate_and_updated_time(&self, asset: &AssetId, now: Timestamp) -> (Decimal, Timestamp) {
        if *asset == self.base_asset {
            return (Decimal::ONE, now);
        }
        self.current(asset)
            .map(|r| (r.rate, r.timestamp))
            .unwrap_or((Decimal::ZERO, 0))
    }

    pub fn last_rate_update_time(&self, asset: &AssetId) -> Option<Timestamp> {
        self.current(asset).map(|r| r.timestamp)
    }

    /// Id of the latest round for an asset; 0 if never updated.
    pub fn current_round_id(&self, asset: &AssetId) -> u64 {
        self.rates.get(asset).map(|e| e.last_round_id).unwrap_or(0)
    }

    /// Look up a past round, if still within the retained history.
    pub fn rate_and_timestamp_at_round(&self, asset: &AssetId, round_id: u64) -> Option<RateRound> {
        self.rates
            .get(asset)?
            .history
            .iter()
            .find(|r| r.round_id == round_id)
            .copied()
    }

    pub fn rate_stale_period(&self, asset: &AssetId) -> u64 {
        self.stale_period_overrides
            .get(asset)
            .copied()
            .unwrap_or(self.default_stale_period_secs)
    }

    /// Set the staleness window for one asset, or the global default when `asset` is `None`.
    pub fn set_rate_stale_period(&mut self, asset: Option<&AssetId>, secs: u64) {
        match asset {
            Some(asset) => {
                self.stale_period_overrides.insert(asset.clone(), secs);
            }
            None => self.default_stale_period_secs = secs,
        }
        tracing::info!(asset = ?asset.map(AssetId::as_str), secs, "Rate stale period set");
    }

    pub fn rate_is_stale(&self, asset: &AssetId, now: Timestamp) -> bool {
        if *asset == self.base_asset {
            return false;
        }
        match self.current(asset) {
            Some(round) => now.saturating_sub(round.timestamp) > self.rate_stale_period(asset),
            None => true,
        }
    }

    pub fn any_rate_is_stale(&self, assets: &[AssetId], now: Timestamp) -> bool {
        assets.iter().any(|a| self.rate_is_stale(a, now))
    }

    /// Fail with `StaleRate` naming the first stale asset.
    pub fn ensure_fresh<'a, I>(&self, assets: I, now: Timestamp) -> SynthResult<()>
    where
        I: IntoIterator<Item = &'a AssetId>,
    {
        match assets.into_iter().find(|a| self.rate_is_stale(a, now)) {
            Some(stale) => Err(SynthError::StaleRate(stale.clone())),
            None => Ok(()),
        }
    }

    /// Value of `amount` of `src` expressed in `dest`: `amount * rate(src) / rate(dest)`.
    pub fn effective_value(
        &self,
        src: &AssetId,
        amount: Decimal,
        dest: &AssetId,
    ) -> SynthResult<Decimal> {
        if src == dest {
            return Ok(amount);
        }
        let dest_rate = self.rate_for_currency(dest);
        if dest_rate.is_zero() {
            return Err(SynthError::StaleRate(dest.clone()));
        }
        amount
            .checked_mul_div(self.rate_for_currency(src), dest_rate)
            .or_overflow()
    }

    pub fn set_inverse_pricing(
        &mut self,
        asset: &AssetId,
        entry_point: Decimal,
        upper_limit: Decimal,
        lower_limit: Decimal,
    ) -> SynthResult<()> {
        if *asset == self.base_asset {
            return Err(SynthError::Validation(format!(
                "{} cannot be priced inversely",
                asset
            )));
        }
        let pricing = InversePricing::new(entry_point, upper_limit, lower_limit)?;
        self.inverse_pricing.insert(asset.clone(), pricing);
        tracing::info!(
            asset = %asset,
            entry_point = %entry_point,
            upper_limit = %upper_limit,
            lower_limit = %lower_limit,
            "Inverse pricing set"
        );
        Ok(())
    }

    pub fn remove_inverse_pricing(&mut self, asset: &AssetId) -> Option<InversePricing> {
        self.inverse_pricing.remove(asset)
    }

    pub fn inverse_pricing(&self, asset: &AssetId) -> Option<&InversePricing> {
        self.inverse_pricing.get(asset)
    }

    fn current(&self, asset: &AssetId) -> Option<RateRound> {
        self.rates.get(asset).and_then(|e| e.current)
    }
}
