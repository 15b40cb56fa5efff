use serde::Deserialize;

use crate::decimal::Decimal;
use crate::error::{SynthError, SynthResult};
use crate::types::{AccountId, AssetClass, AssetId};

/// Hard bounds on governance-adjustable settings.
pub mod limits {
    use crate::decimal::Decimal;

    /// Issuance ratio may not exceed 100% of collateral value.
    pub const MAX_ISSUANCE_RATIO: Decimal = Decimal::ONE;
    /// 10%
    pub const MAX_EXCHANGE_FEE_RATE: Decimal = Decimal::from_raw(Decimal::UNIT / 10);
    /// 25%
    pub const MAX_LIQUIDATION_PENALTY: Decimal = Decimal::from_raw(Decimal::UNIT / 4);
    pub const MIN_LIQUIDATION_DELAY_SECS: u64 = 24 * 60 * 60;
    pub const MAX_LIQUIDATION_DELAY_SECS: u64 = 30 * 24 * 60 * 60;
    pub const MIN_FEE_PERIOD_DURATION_SECS: u64 = 60 * 60;
    pub const MAX_FEE_PERIOD_DURATION_SECS: u64 = 60 * 24 * 60 * 60;
    pub const MIN_FEE_PERIOD_COUNT: usize = 2;
    /// 50%
    pub const MAX_TARGET_THRESHOLD: Decimal = Decimal::from_raw(Decimal::UNIT / 2);
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Synth that debt is denominated in and fees are paid in (always priced at 1)
    pub base_asset: AssetId,

    /// Reserve asset locked as collateral
    pub collateral_asset: AssetId,

    /// Additional synths registered at start-up
    pub synths: Vec<(AssetId, AssetClass)>,

    /// Account allowed to change settings
    pub owner: AccountId,

    /// Account allowed to push rates
    pub oracle: AccountId,

    /// Account that holds collected exchange fees (in the base synth)
    pub fee_address: AccountId,

    /// Account that holds collateral set aside for reward distribution
    pub rewards_address: AccountId,

    /// Max debt as a fraction of collateral value (default: 0.125)
    pub issuance_ratio: Decimal,

    /// Debt/collateral ratio at which an account can be flagged (default: 0.5)
    pub liquidation_ratio: Decimal,

    /// Collateral bonus paid to liquidators (default: 0.1)
    pub liquidation_penalty: Decimal,

    /// Cooldown between flagging and liquidation (default: 3 days)
    pub liquidation_delay_secs: u64,

    /// Default staleness window for rates (default: 3 hours)
    pub rate_stale_period_secs: u64,

    /// How far in the future an oracle timestamp may be (default: 10 minutes)
    pub rate_future_tolerance_secs: u64,

    /// Number of past rounds kept per asset (default: 16)
    pub rate_history_len: usize,

    /// Settlement waiting period after an exchange (default: 180)
    pub waiting_period_secs: u64,

    /// Max queued exchange entries per (account, asset) (default: 12)
    pub max_entries_in_queue: usize,

    /// Base exchange fee rate (default: 0.003)
    pub exchange_fee_rate: Decimal,

    /// Whether exchanges are enabled at start-up (default: true)
    pub exchange_enabled: bool,

    /// Minimum fee period length before it can be closed (default: 7 days)
    pub fee_period_duration_secs: u64,

    /// Number of fee periods kept in the ring (default: 2)
    pub fee_period_count: usize,

    /// Slack above the issuance ratio within which fees stay claimable (default: 0.01)
    pub target_threshold: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_asset: AssetId::from("sUSD"),
            collateral_asset: AssetId::from("SNX"),
            synths: vec![
                (AssetId::from("sBTC"), AssetClass::Standard),
                (AssetId::from("sETH"), AssetClass::Standard),
                (AssetId::from("iBTC"), AssetClass::Inverse),
            ],
            owner: AccountId::from("owner"),
            oracle: AccountId::from("oracle"),
            fee_address: AccountId::from("fee-pool"),
            rewards_address: AccountId::from("rewards-pool"),
            issuance_ratio: Decimal::from_raw(Decimal::UNIT / 8),
            liquidation_ratio: Decimal::from_raw(Decimal::UNIT / 2),
            liquidation_penalty: Decimal::from_raw(Decimal::UNIT / 10),
            liquidation_delay_secs: 3 * 24 * 60 * 60,
            rate_stale_period_secs: 3 * 60 * 60,
            rate_future_tolerance_secs: 10 * 60,
            rate_history_len: 16,
            waiting_period_secs: 180,
            max_entries_in_queue: 12,
            exchange_fee_rate: Decimal::from_raw(3 * Decimal::UNIT / 1_000),
            exchange_enabled: true,
            fee_period_duration_secs: 7 * 24 * 60 * 60,
            fee_period_count: 2,
            target_threshold: Decimal::from_raw(Decimal::UNIT / 100),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            base_asset: std::env::var("SYNTH_BASE_ASSET")
                .map(AssetId::from)
                .unwrap_or(defaults.base_asset),
            collateral_asset: std::env::var("SYNTH_COLLATERAL_ASSET")
                .map(AssetId::from)
                .unwrap_or(defaults.collateral_asset),
            synths: match std::env::var("SYNTH_SYNTHS") {
                Ok(raw) => parse_synth_list(&raw)?,
                Err(_) => defaults.synths,
            },
            owner: std::env::var("SYNTH_OWNER")
                .map(AccountId::from)
                .unwrap_or(defaults.owner),
            oracle: std::env::var("SYNTH_ORACLE")
                .map(AccountId::from)
                .unwrap_or(defaults.oracle),
            fee_address: std::env::var("SYNTH_FEE_ADDRESS")
                .map(AccountId::from)
                .unwrap_or(defaults.fee_address),
            rewards_address: std::env::var("SYNTH_REWARDS_ADDRESS")
                .map(AccountId::from)
                .unwrap_or(defaults.rewards_address),
            issuance_ratio: env_parse("SYNTH_ISSUANCE_RATIO", defaults.issuance_ratio)?,
            liquidation_ratio: env_parse("SYNTH_LIQUIDATION_RATIO", defaults.liquidation_ratio)?,
            liquidation_penalty: env_parse(
                "SYNTH_LIQUIDATION_PENALTY",
                defaults.liquidation_penalty,
            )?,
            liquidation_delay_secs: env_parse(
                "SYNTH_LIQUIDATION_DELAY_SECS",
                defaults.liquidation_delay_secs,
            )?,
            rate_stale_period_secs: env_parse(
                "SYNTH_RATE_STALE_PERIOD_SECS",
                defaults.rate_stale_period_secs,
            )?,
            rate_future_tolerance_secs: env_parse(
                "SYNTH_RATE_FUTURE_TOLERANCE_SECS",
                defaults.rate_future_tolerance_secs,
            )?,
            rate_history_len: env_parse("SYNTH_RATE_HISTORY_LEN", defaults.rate_history_len)?,
            waiting_period_secs: env_parse(
                "SYNTH_WAITING_PERIOD_SECS",
                defaults.waiting_period_secs,
            )?,
            max_entries_in_queue: env_parse(
                "SYNTH_MAX_ENTRIES_IN_QUEUE",
                defaults.max_entries_in_queue,
            )?,
            exchange_fee_rate: env_parse("SYNTH_EXCHANGE_FEE_RATE", defaults.exchange_fee_rate)?,
            exchange_enabled: env_parse("SYNTH_EXCHANGE_ENABLED", defaults.exchange_enabled)?,
            fee_period_duration_secs: env_parse(
                "SYNTH_FEE_PERIOD_DURATION_SECS",
                defaults.fee_period_duration_secs,
            )?,
            fee_period_count: env_parse("SYNTH_FEE_PERIOD_COUNT", defaults.fee_period_count)?,
            target_threshold: env_parse("SYNTH_TARGET_THRESHOLD", defaults.target_threshold)?,
        };

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid engine configuration: {}", e))?;
        tracing::info!(
            base = %config.base_asset,
            collateral = %config.collateral_asset,
            synths = config.synths.len(),
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Check every setting against the same bounds the runtime setters enforce.
    pub fn validate(&self) -> SynthResult<()> {
        if self.base_asset == self.collateral_asset {
            return Err(SynthError::Config(
                "base asset and collateral asset must differ".to_string(),
            ));
        }
        if self
            .synths
            .iter()
            .any(|(asset, _)| *asset == self.base_asset || *asset == self.collateral_asset)
        {
            return Err(SynthError::Config(
                "synth list must not contain the base or collateral asset".to_string(),
            ));
        }
        validate_issuance_ratio(self.issuance_ratio)?;
        validate_liquidation_penalty(self.liquidation_penalty)?;
        validate_liquidation_ratio(
            self.liquidation_ratio,
            self.issuance_ratio,
            self.liquidation_penalty,
        )?;
        validate_liquidation_delay(self.liquidation_delay_secs)?;
        validate_exchange_fee_rate(self.exchange_fee_rate)?;
        validate_fee_period_duration(self.fee_period_duration_secs)?;
        validate_target_threshold(self.target_threshold)?;
        if self.max_entries_in_queue == 0 {
            return Err(SynthError::Config(
                "max_entries_in_queue must be at least 1".to_string(),
            ));
        }
        if self.fee_period_count < limits::MIN_FEE_PERIOD_COUNT {
            return Err(SynthError::Config(format!(
                "fee_period_count must be at least {}",
                limits::MIN_FEE_PERIOD_COUNT
            )));
        }
        if self.rate_history_len == 0 {
            return Err(SynthError::Config(
                "rate_history_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn validate_issuance_ratio(ratio: Decimal) -> SynthResult<()> {
    if ratio > limits::MAX_ISSUANCE_RATIO {
        return Err(SynthError::Config(format!(
            "issuance ratio {} exceeds max {}",
            ratio,
            limits::MAX_ISSUANCE_RATIO
        )));
    }
    Ok(())
}

pub fn validate_liquidation_penalty(penalty: Decimal) -> SynthResult<()> {
    if penalty > limits::MAX_LIQUIDATION_PENALTY {
        return Err(SynthError::Config(format!(
            "liquidation penalty {} exceeds max {}",
            penalty,
            limits::MAX_LIQUIDATION_PENALTY
        )));
    }
    Ok(())
}

/// The liquidation ratio must sit above the issuance ratio and at or below
/// `1 / (1 + penalty)`, otherwise the fix-collateral formula has no solution.
pub fn validate_liquidation_ratio(
    ratio: Decimal,
    issuance_ratio: Decimal,
    penalty: Decimal,
) -> SynthResult<()> {
    let max_ratio = Decimal::ONE
        .checked_div(Decimal::ONE.saturating_add(penalty))
        .ok_or(SynthError::MathOverflow)?;
    if ratio > max_ratio {
        return Err(SynthError::Config(format!(
            "liquidation ratio {} exceeds 1 / (1 + penalty) = {}",
            ratio, max_ratio
        )));
    }
    if ratio <= issuance_ratio {
        return Err(SynthError::Config(format!(
            "liquidation ratio {} must exceed issuance ratio {}",
            ratio, issuance_ratio
        )));
    }
    Ok(())
}

pub fn validate_liquidation_delay(secs: u64) -> SynthResult<()> {
    if !(limits::MIN_LIQUIDATION_DELAY_SECS..=limits::MAX_LIQUIDATION_DELAY_SECS).contains(&secs)
    {
        return Err(SynthError::Config(format!(
            "liquidation delay {}s outside [{}, {}]",
            secs,
            limits::MIN_LIQUIDATION_DELAY_SECS,
            limits::MAX_LIQUIDATION_DELAY_SECS
        )));
    }
    Ok(())
}

pub fn validate_exchange_fee_rate(rate: Decimal) -> SynthResult<()> {
    if rate > limits::MAX_EXCHANGE_FEE_RATE {
        return Err(SynthError::Config(format!(
            "exchange fee rate {} exceeds max {}",
            rate,
            limits::MAX_EXCHANGE_FEE_RATE
        )));
    }
    Ok(())
}

pub fn validate_fee_period_duration(secs: u64) -> SynthResult<()> {
    if !(limits::MIN_FEE_PERIOD_DURATION_SECS..=limits::MAX_FEE_PERIOD_DURATION_SECS)
        .contains(&secs)
    {
        return Err(SynthError::Config(format!(
            "fee period duration {}s outside [{}, {}]",
            secs,
            limits::MIN_FEE_PERIOD_DURATION_SECS,
            limits::MAX_FEE_PERIOD_DURATION_SECS
        )));
    }
    Ok(())
}

pub fn validate_target_threshold(threshold: Decimal) -> SynthResult<()> {
    if threshold > limits::MAX_TARGET_THRESHOLD {
        return Err(SynthError::Config(format!(
            "target threshold {} exceeds max {}",
            threshold,
            limits::MAX_TARGET_THRESHOLD
        )));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Parse `"sBTC,sETH,iBTC:inverse"` into synth keys with their classes.
pub fn parse_synth_list(raw: &str) -> anyhow::Result<Vec<(AssetId, AssetClass)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once(':') {
            Some((key, class)) => class
                .parse::<AssetClass>()
                .map(|class| (AssetId::from(key.trim()), class))
                .map_err(|e| anyhow::anyhow!("SYNTH_SYNTHS: {}", e)),
            None => Ok((AssetId::from(item), AssetClass::Standard)),
        })
        .collect()
}
