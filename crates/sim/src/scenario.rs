//! JSON scenario format.
//!
//! A scenario is a list of steps replayed in order against one system:
//!
//! ```json
//! {
//!   "name": "issue and exchange",
//!   "steps": [
//!     { "op": "update_rates", "rates": { "SNX": "1", "sETH": "200" } },
//!     { "op": "fund", "account": "alice", "asset": "SNX", "amount": "1000" },
//!     { "op": "issue", "account": "alice", "amount": "100" },
//!     { "op": "issue", "account": "alice", "amount": "100", "expect_error": "exceeds remaining" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

use synth_common::{AccountId, AssetId, Decimal, Timestamp};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Clock start. Defaults to wall-clock time.
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = serde_json::from_str(raw)?;
        if scenario.steps.is_empty() {
            anyhow::bail!("scenario '{}' has no steps", scenario.name);
        }
        Ok(scenario)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    /// Substring the step's error must contain. The step must fail when set.
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    AdvanceTime {
        secs: u64,
    },
    UpdateRates {
        rates: BTreeMap<AssetId, Decimal>,
        /// Defaults to the current clock time.
        #[serde(default)]
        time_sent: Option<Timestamp>,
    },
    /// Mint directly through the balance collaborator.
    Fund {
        account: AccountId,
        asset: AssetId,
        amount: Decimal,
    },
    Escrow {
        account: AccountId,
        amount: Decimal,
    },
    Issue {
        account: AccountId,
        amount: Decimal,
    },
    IssueMax {
        account: AccountId,
    },
    Burn {
        account: AccountId,
        amount: Decimal,
    },
    BurnToTarget {
        account: AccountId,
    },
    Exchange {
        account: AccountId,
        src: AssetId,
        amount: Decimal,
        dest: AssetId,
    },
    Settle {
        account: AccountId,
        asset: AssetId,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        asset: AssetId,
        amount: Decimal,
    },
    CloseFeePeriod,
    ClaimFees {
        account: AccountId,
    },
    /// Run by the configured owner.
    DistributeRewards {
        amount: Decimal,
    },
    Flag {
        account: AccountId,
        flagger: AccountId,
    },
    CheckAndRemove {
        account: AccountId,
    },
    Liquidate {
        account: AccountId,
        liquidator: AccountId,
        amount: Decimal,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AdvanceTime { .. } => "advance_time",
            Action::UpdateRates { .. } => "update_rates",
            Action::Fund { .. } => "fund",
            Action::Escrow { .. } => "escrow",
            Action::Issue { .. } => "issue",
            Action::IssueMax { .. } => "issue_max",
            Action::Burn { .. } => "burn",
            Action::BurnToTarget { .. } => "burn_to_target",
            Action::Exchange { .. } => "exchange",
            Action::Settle { .. } => "settle",
            Action::Transfer { .. } => "transfer",
            Action::CloseFeePeriod => "close_fee_period",
            Action::ClaimFees { .. } => "claim_fees",
            Action::DistributeRewards { .. } => "distribute_rewards",
            Action::Flag { .. } => "flag",
            Action::CheckAndRemove { .. } => "check_and_remove",
            Action::Liquidate { .. } => "liquidate",
        }
    }
}
