//! Replays a [`Scenario`] against an in-memory synth system.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use synth_common::clock::{Clock, ManualClock};
use synth_common::config::EngineConfig;
use synth_common::{AssetId, Decimal, SynthError, SynthResult, Timestamp};
use synth_engine::{Balances, InMemorySystem, SynthSystem};

use crate::scenario::{Action, Scenario, Step};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("step {index} ({op}) failed: {source}")]
    StepFailed {
        index: usize,
        op: &'static str,
        #[source]
        source: SynthError,
    },

    #[error("step {index} ({op}) succeeded but was expected to fail with '{expected}'")]
    UnexpectedSuccess {
        index: usize,
        op: &'static str,
        expected: String,
    },

    #[error("step {index} ({op}) failed with '{actual}', expected '{expected}'")]
    WrongError {
        index: usize,
        op: &'static str,
        expected: String,
        actual: String,
    },

    #[error("could not start system: {0}")]
    Setup(#[from] SynthError),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub timestamp: Timestamp,
    /// Output of a successful step.
    pub output: Option<serde_json::Value>,
    /// Error of a step that failed as expected.
    pub rejected: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub steps: usize,
    pub rejected_as_expected: usize,
    pub events: usize,
    pub final_time: Timestamp,
    /// `None` when a rate is stale at the end of the run.
    pub total_issued_synths: Option<Decimal>,
    pub debt_ledger_len: usize,
    pub flagged_accounts: usize,
    pub queued_exchanges: usize,
    pub fee_period_id: u64,
}

pub struct ScenarioRunner {
    system: InMemorySystem,
    clock: ManualClock,
    reports: Vec<StepReport>,
}

impl ScenarioRunner {
    pub fn new(config: EngineConfig, start: Timestamp) -> Result<Self, ScenarioError> {
        let clock = ManualClock::new(start);
        let system = SynthSystem::in_memory(config, clock.clone())?;
        Ok(Self {
            system,
            clock,
            reports: Vec::new(),
        })
    }

    pub fn system(&self) -> &InMemorySystem {
        &self.system
    }

    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    /// Run every step, stopping at the first one that does not behave as expected.
    pub fn run(&mut self, scenario: &Scenario) -> Result<RunSummary, ScenarioError> {
        tracing::info!(
            scenario = %scenario.name,
            steps = scenario.steps.len(),
            start = self.clock.now(),
            "Scenario started"
        );
        for (index, step) in scenario.steps.iter().enumerate() {
            self.run_step(index, step)?;
        }
        let summary = self.summary(&scenario.name);
        tracing::info!(
            scenario = %summary.scenario,
            steps = summary.steps,
            rejected = summary.rejected_as_expected,
            events = summary.events,
            "Scenario finished"
        );
        Ok(summary)
    }

    pub fn run_step(&mut self, index: usize, step: &Step) -> Result<&StepReport, ScenarioError> {
        let op = step.action.name();
        let result = self.apply(&step.action);
        let timestamp = self.clock.now();

        let report = match (result, &step.expect_error) {
            (Ok(output), None) => {
                tracing::info!(step = index, op, output = %output, "Step ok");
                StepReport {
                    index,
                    op,
                    timestamp,
                    output: Some(output),
                    rejected: None,
                }
            }
            (Ok(_), Some(expected)) => {
                return Err(ScenarioError::UnexpectedSuccess {
                    index,
                    op,
                    expected: expected.clone(),
                });
            }
            (Err(source), None) => {
                tracing::error!(step = index, op, error = %source, "Step failed");
                return Err(ScenarioError::StepFailed { index, op, source });
            }
            (Err(err), Some(expected)) => {
                let actual = err.to_string();
                if !actual.contains(expected.as_str()) {
                    return Err(ScenarioError::WrongError {
                        index,
                        op,
                        expected: expected.clone(),
                        actual,
                    });
                }
                tracing::info!(step = index, op, error = %actual, "Step rejected as expected");
                StepReport {
                    index,
                    op,
                    timestamp,
                    output: None,
                    rejected: Some(actual),
                }
            }
        };
        self.reports.push(report);
        Ok(&self.reports[self.reports.len() - 1])
    }

    fn apply(&mut self, action: &Action) -> SynthResult<serde_json::Value> {
        let system = &mut self.system;
        let output = match action {
            Action::AdvanceTime { secs } => {
                self.clock.advance(*secs);
                json!({ "now": self.clock.now() })
            }
            Action::UpdateRates { rates, time_sent } => {
                let assets: Vec<AssetId> = rates.keys().cloned().collect();
                let values: Vec<Decimal> = rates.values().copied().collect();
                let oracle = system.config().oracle.clone();
                let time_sent = time_sent.unwrap_or_else(|| self.clock.now());
                json!(system.update_rates(&oracle, &assets, &values, time_sent)?)
            }
            Action::Fund {
                account,
                asset,
                amount,
            } => {
                system.balances_mut().mint(asset, account, *amount)?;
                json!({ "balance": system.balance_of(asset, account) })
            }
            Action::Escrow { account, amount } => {
                system.escrow_mut().set_escrowed(account, *amount);
                json!({ "escrowed": amount })
            }
            Action::Issue { account, amount } => json!(system.issue_synths(account, *amount)?),
            Action::IssueMax { account } => json!(system.issue_max_synths(account)?),
            Action::Burn { account, amount } => json!(system.burn_synths(account, *amount)?),
            Action::BurnToTarget { account } => json!(system.burn_synths_to_target(account)?),
            Action::Exchange {
                account,
                src,
                amount,
                dest,
            } => json!(system.exchange(account, src, *amount, dest)?),
            Action::Settle { account, asset } => json!(system.settle(account, asset)?),
            Action::Transfer {
                from,
                to,
                asset,
                amount,
            } => json!(system.transfer(from, to, asset, *amount)?),
            Action::CloseFeePeriod => json!(system.close_current_fee_period()?),
            Action::ClaimFees { account } => json!(system.claim_fees(account)?),
            Action::DistributeRewards { amount } => {
                let owner = system.config().owner.clone();
                system.distribute_rewards(&owner, *amount)?;
                json!({ "amount": amount })
            }
            Action::Flag { account, flagger } => {
                json!(system.flag_account_for_liquidation(account, flagger)?)
            }
            Action::CheckAndRemove { account } => {
                json!({ "removed": system.check_and_remove_account_in_liquidation(account)? })
            }
            Action::Liquidate {
                account,
                liquidator,
                amount,
            } => json!(system.liquidate_delinquent_account(account, liquidator, *amount)?),
        };
        Ok(output)
    }

    pub fn summary(&self, scenario: &str) -> RunSummary {
        let base = self.system.config().base_asset.clone();
        RunSummary {
            scenario: scenario.to_string(),
            steps: self.reports.len(),
            rejected_as_expected: self.reports.iter().filter(|r| r.rejected.is_some()).count(),
            events: self.system.events().len(),
            final_time: self.clock.now(),
            total_issued_synths: self.system.total_issued_synths(&base).ok(),
            debt_ledger_len: self.system.debt_ledger().len(),
            flagged_accounts: self.system.liquidations().flagged_count(),
            queued_exchanges: self.system.exchanger().state().total_entries(),
            fee_period_id: self.system.fee_pool().current_period().fee_period_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: Timestamp = 1_700_000_000;

    fn step(raw: &str) -> Step {
        serde_json::from_str(raw).unwrap()
    }

    fn runner() -> ScenarioRunner {
        let mut runner = ScenarioRunner::new(EngineConfig::default(), START).unwrap();
        runner
            .run_step(0, &step(r#"{ "op": "update_rates", "rates": { "SNX": "1", "sBTC": "10000", "sETH": "200", "iBTC": "10000" } }"#))
            .unwrap();
        runner
            .run_step(1, &step(r#"{ "op": "fund", "account": "alice", "asset": "SNX", "amount": "1000" }"#))
            .unwrap();
        runner
    }

    #[test]
    fn test_expected_error_matches_substring() {
        let mut r = runner();
        let report = r
            .run_step(2, &step(r#"{ "op": "issue", "account": "alice", "amount": "200", "expect_error": "exceeds remaining issuable" }"#))
            .unwrap();
        assert!(report.rejected.is_some());
        assert!(r.system().debt_ledger().is_empty());
    }

    #[test]
    fn test_unexpected_outcomes_are_errors() {
        let mut r = runner();
        assert!(matches!(
            r.run_step(2, &step(r#"{ "op": "issue", "account": "alice", "amount": "10", "expect_error": "anything" }"#)),
            Err(ScenarioError::UnexpectedSuccess { index: 2, op: "issue", .. })
        ));
        assert!(matches!(
            r.run_step(3, &step(r#"{ "op": "burn", "account": "bob", "amount": "10", "expect_error": "stale" }"#)),
            Err(ScenarioError::WrongError { index: 3, .. })
        ));
        assert!(matches!(
            r.run_step(4, &step(r#"{ "op": "close_fee_period" }"#)),
            Err(ScenarioError::StepFailed {
                source: SynthError::FeePeriodNotElapsed { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_advance_time_moves_clock() {
        let mut r = runner();
        r.run_step(2, &step(r#"{ "op": "advance_time", "secs": 60 }"#))
            .unwrap();
        let summary = r.summary("t");
        assert_eq!(summary.final_time, START + 60);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.fee_period_id, 1);
    }
}
