//! Integration tests for the exchange rate oracle.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p synth-oracle --test integration
//! ```

use synth_common::config::EngineConfig;
use synth_common::{AssetId, Decimal, SynthError, Timestamp};
use synth_oracle::{ExchangeRates, OracleSettings};

const T0: Timestamp = 1_700_000_000;

// ============================================================
// Shared helpers
// ============================================================

fn default_oracle() -> ExchangeRates {
    let config = EngineConfig::default();
    ExchangeRates::new(config.base_asset.clone(), OracleSettings::from(&config))
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn assets(names: &[&str]) -> Vec<AssetId> {
    names.iter().map(|n| AssetId::from(*n)).collect()
}

// ============================================================
// Rate feed
// ============================================================

#[test]
fn test_batch_update_is_visible_to_all_readers() {
    let mut rates = default_oracle();
    let keys = assets(&["SNX", "sBTC", "sETH"]);
    let update = rates
        .update_rates(
            &keys,
            &[dec("2.5"), Decimal::from_int(40_000), Decimal::from_int(2_000)],
            T0,
            T0,
        )
        .unwrap();
    assert_eq!(update.applied.len(), 3);
    assert!(update.skipped.is_empty());

    assert_eq!(
        rates.rates_for_currencies(&keys),
        vec![dec("2.5"), Decimal::from_int(40_000), Decimal::from_int(2_000)]
    );
    assert_eq!(rates.last_rate_update_time(&AssetId::from("sBTC")), Some(T0));
    assert!(!rates.any_rate_is_stale(&keys, T0 + 60));
}

#[test]
fn test_default_stale_window_follows_config() {
    let mut rates = default_oracle();
    let snx = AssetId::from("SNX");
    rates.update_rates(&[snx.clone()], &[Decimal::ONE], T0, T0).unwrap();

    let window = EngineConfig::default().rate_stale_period_secs;
    assert_eq!(rates.rate_stale_period(&snx), window);
    assert!(!rates.rate_is_stale(&snx, T0 + window));
    assert!(rates.rate_is_stale(&snx, T0 + window + 1));

    rates.set_rate_stale_period(None, window * 2);
    assert!(!rates.rate_is_stale(&snx, T0 + window + 1));
}

#[test]
fn test_timestamp_within_tolerance_is_accepted() {
    let mut rates = default_oracle();
    let tolerance = EngineConfig::default().rate_future_tolerance_secs;
    assert!(
        rates
            .update_rates(&assets(&["SNX"]), &[Decimal::ONE], T0 + tolerance, T0)
            .is_ok()
    );
    assert_eq!(
        rates.update_rates(&assets(&["SNX"]), &[Decimal::ONE], T0 + tolerance + 1, T0),
        Err(SynthError::FutureTimestamp {
            time_sent: T0 + tolerance + 1,
            now: T0,
        })
    );
}

#[test]
fn test_mixed_batch_applies_newer_and_skips_older() {
    let mut rates = default_oracle();
    rates
        .update_rates(&assets(&["sBTC"]), &[Decimal::from_int(40_000)], T0 + 100, T0 + 100)
        .unwrap();

    let update = rates
        .update_rates(
            &assets(&["sBTC", "sETH"]),
            &[Decimal::from_int(1), Decimal::from_int(2_000)],
            T0 + 50,
            T0 + 100,
        )
        .unwrap();
    assert_eq!(update.skipped, assets(&["sBTC"]));
    assert_eq!(update.applied.len(), 1);
    assert_eq!(rates.rate_for_currency(&AssetId::from("sBTC")), Decimal::from_int(40_000));
    assert_eq!(rates.rate_for_currency(&AssetId::from("sETH")), Decimal::from_int(2_000));
}

#[test]
fn test_update_report_serializes() {
    let mut rates = default_oracle();
    let update = rates
        .update_rates(&assets(&["SNX"]), &[dec("1.25")], T0, T0)
        .unwrap();
    let json = serde_json::to_value(&update).unwrap();
    assert_eq!(json["applied"][0][0], "SNX");
    assert_eq!(json["applied"][0][1]["rate"], "1.25");
    assert_eq!(json["applied"][0][1]["round_id"], 1);
}

// ============================================================
// Valuation
// ============================================================

#[test]
fn test_effective_value_through_base_asset() {
    let mut rates = default_oracle();
    rates
        .update_rates(&assets(&["SNX"]), &[dec("0.5")], T0, T0)
        .unwrap();
    let usd = AssetId::from("sUSD");
    let snx = AssetId::from("SNX");

    assert_eq!(
        rates.effective_value(&snx, Decimal::from_int(100), &usd).unwrap(),
        Decimal::from_int(50)
    );
    assert_eq!(
        rates.effective_value(&usd, Decimal::from_int(50), &snx).unwrap(),
        Decimal::from_int(100)
    );
    // Same asset is returned untouched even without a rate
    let unknown = AssetId::from("sXYZ");
    assert_eq!(
        rates.effective_value(&unknown, dec("3"), &unknown).unwrap(),
        dec("3")
    );
}

#[test]
fn test_deleted_rate_blocks_valuation_into_asset() {
    let mut rates = default_oracle();
    let eth = AssetId::from("sETH");
    rates
        .update_rates(&[eth.clone()], &[Decimal::from_int(2_000)], T0, T0)
        .unwrap();
    rates.delete_rate(&eth).unwrap();
    assert_eq!(
        rates.effective_value(&AssetId::from("sUSD"), Decimal::ONE, &eth),
        Err(SynthError::StaleRate(eth.clone()))
    );
    assert_eq!(
        rates.ensure_fresh([&eth], T0),
        Err(SynthError::StaleRate(eth))
    );
}

// ============================================================
// Inverse synths
// ============================================================

#[test]
fn test_inverse_freeze_survives_further_updates() {
    let mut rates = default_oracle();
    let ibtc = AssetId::from("iBTC");
    rates
        .set_inverse_pricing(
            &ibtc,
            Decimal::from_int(40_000),
            Decimal::from_int(60_000),
            Decimal::from_int(20_000),
        )
        .unwrap();

    rates
        .update_rates(&[ibtc.clone()], &[Decimal::from_int(45_000)], T0, T0)
        .unwrap();
    assert_eq!(rates.rate_for_currency(&ibtc), Decimal::from_int(35_000));

    let update = rates
        .update_rates(&[ibtc.clone()], &[Decimal::from_int(70_000)], T0 + 1, T0 + 1)
        .unwrap();
    assert_eq!(update.frozen, vec![ibtc.clone()]);
    assert_eq!(rates.rate_for_currency(&ibtc), Decimal::from_int(20_000));

    rates
        .update_rates(&[ibtc.clone()], &[Decimal::from_int(40_000)], T0 + 2, T0 + 2)
        .unwrap();
    assert_eq!(rates.rate_for_currency(&ibtc), Decimal::from_int(20_000));
    // Frozen rates still carry a fresh timestamp
    assert!(!rates.rate_is_stale(&ibtc, T0 + 2));

    // Resetting the pricing unfreezes
    rates
        .set_inverse_pricing(
            &ibtc,
            Decimal::from_int(40_000),
            Decimal::from_int(60_000),
            Decimal::from_int(20_000),
        )
        .unwrap();
    rates
        .update_rates(&[ibtc.clone()], &[Decimal::from_int(41_000)], T0 + 3, T0 + 3)
        .unwrap();
    assert_eq!(rates.rate_for_currency(&ibtc), Decimal::from_int(39_000));
}

#[test]
fn test_base_asset_cannot_be_inverse() {
    let mut rates = default_oracle();
    assert!(
        rates
            .set_inverse_pricing(
                &AssetId::from("sUSD"),
                Decimal::from_int(1),
                dec("1.5"),
                dec("0.5"),
            )
            .is_err()
    );
}
