use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Identifier of a priced asset (collateral, base synth or any other synth).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a participant account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pricing class of a synth. Drives the exchange fee multiplier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Standard,
    Inverse,
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetClass::Standard => write!(f, "standard"),
            AssetClass::Inverse => write!(f, "inverse"),
        }
    }
}

impl std::str::FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(AssetClass::Standard),
            "inverse" => Ok(AssetClass::Inverse),
            other => Err(format!("unknown asset class '{}'", other)),
        }
    }
}

/// Kinds of records appended to the ledger event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Oracle
    RatesUpdated,
    RateDeleted,
    InversePriceFrozen,

    // Issuer
    SynthAdded,
    SynthRemoved,
    SynthsIssued,
    SynthsBurned,

    // Exchanger
    SynthExchange,
    ExchangeReclaim,
    ExchangeRebate,
    Transfer,

    // FeePool
    FeePeriodClosed,
    FeesForfeited,
    RewardsDistributed,
    FeesClaimed,

    // Liquidations
    AccountFlaggedForLiquidation,
    AccountRemovedFromLiquidation,
    AccountLiquidated,

    // Admin
    SettingUpdated,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::RatesUpdated => write!(f, "rates_updated"),
            EventType::RateDeleted => write!(f, "rate_deleted"),
            EventType::InversePriceFrozen => write!(f, "inverse_price_frozen"),
            EventType::SynthAdded => write!(f, "synth_added"),
            EventType::SynthRemoved => write!(f, "synth_removed"),
            EventType::SynthsIssued => write!(f, "synths_issued"),
            EventType::SynthsBurned => write!(f, "synths_burned"),
            EventType::SynthExchange => write!(f, "synth_exchange"),
            EventType::ExchangeReclaim => write!(f, "exchange_reclaim"),
            EventType::ExchangeRebate => write!(f, "exchange_rebate"),
            EventType::Transfer => write!(f, "transfer"),
            EventType::FeePeriodClosed => write!(f, "fee_period_closed"),
            EventType::FeesForfeited => write!(f, "fees_forfeited"),
            EventType::RewardsDistributed => write!(f, "rewards_distributed"),
            EventType::FeesClaimed => write!(f, "fees_claimed"),
            EventType::AccountFlaggedForLiquidation => {
                write!(f, "account_flagged_for_liquidation")
            }
            EventType::AccountRemovedFromLiquidation => {
                write!(f, "account_removed_from_liquidation")
            }
            EventType::AccountLiquidated => write!(f, "account_liquidated"),
            EventType::SettingUpdated => write!(f, "setting_updated"),
        }
    }
}

/// A record of something a mutating operation did to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub account: Option<AccountId>,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl LedgerEvent {
    pub fn new(
        event_type: EventType,
        account: Option<&AccountId>,
        timestamp: Timestamp,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            account: account.cloned(),
            timestamp: to_datetime(timestamp),
            data,
        }
    }
}

/// Convert a unix timestamp to a `DateTime<Utc>`, clamping out-of-range values to the epoch.
pub fn to_datetime(timestamp: Timestamp) -> DateTime<Utc> {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}
