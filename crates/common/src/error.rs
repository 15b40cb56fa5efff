use thiserror::Error;

use crate::decimal::Decimal;
use crate::types::{AccountId, AssetId, Timestamp};

/// Error taxonomy shared by every ledger component.
///
/// All variants are reported synchronously; an operation that returns one of
/// these has not mutated any ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error("Rate for {0} is stale or not set")]
    StaleRate(AssetId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient {asset} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: AssetId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Account {0} has no debt")]
    InsufficientDebt(AccountId),

    #[error("Amount {requested} exceeds remaining issuable synths {remaining}")]
    ExceedsMaxIssuable {
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Exchange queue for {asset} is full ({max} entries)")]
    QueueFull { asset: AssetId, max: usize },

    #[error("Settlement required for {asset}: {reclaim} owed back, at most {available} movable")]
    SettlementRequired {
        asset: AssetId,
        reclaim: Decimal,
        available: Decimal,
    },

    #[error("Waiting period active for {asset}: {secs_left}s left")]
    WaitingPeriodActive { asset: AssetId, secs_left: u64 },

    #[error("Exchanging is disabled")]
    ExchangeDisabled,

    #[error("Account {0} is not eligible for liquidation")]
    NotEligibleForLiquidation(AccountId),

    #[error("Account {0} is already flagged for liquidation")]
    AlreadyFlagged(AccountId),

    #[error("Liquidation deadline for {account} has not passed (deadline {deadline})")]
    DeadlineNotPassed {
        account: AccountId,
        deadline: Timestamp,
    },

    #[error("Account {0} has no liquidation set")]
    NoLiquidationSet(AccountId),

    #[error("Fees not claimable: collateralisation ratio {ratio} above threshold {threshold}")]
    FeesNotClaimable { ratio: Decimal, threshold: Decimal },

    #[error("No fees or rewards available for {0}")]
    NoFeesAvailable(AccountId),

    #[error("Fee period has not elapsed: {secs_left}s left")]
    FeePeriodNotElapsed { secs_left: u64 },

    #[error("Timestamp {time_sent} is too far in the future (now {now})")]
    FutureTimestamp { time_sent: Timestamp, now: Timestamp },

    #[error("Unknown asset: {0}")]
    UnknownAsset(AssetId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Arithmetic overflow or division by zero")]
    MathOverflow,
}

pub type SynthResult<T> = Result<T, SynthError>;

/// Extension for turning checked-arithmetic `Option`s into `SynthError::MathOverflow`.
pub trait OrOverflow<T> {
    fn or_overflow(self) -> SynthResult<T>;
}

impl<T> OrOverflow<T> for Option<T> {
    fn or_overflow(self) -> SynthResult<T> {
        self.ok_or(SynthError::MathOverflow)
    }
}
