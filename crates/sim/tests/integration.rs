//! Scenario replay tests.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p synth-sim --test integration
//! ```

use synth_common::config::EngineConfig;
use synth_sim::{Scenario, ScenarioError, ScenarioRunner};

const BASIC: &str = include_str!("../scenarios/basic.json");

fn load(raw: &str) -> Scenario {
    Scenario::from_json(raw).unwrap()
}

fn runner_for(scenario: &Scenario) -> ScenarioRunner {
    ScenarioRunner::new(EngineConfig::default(), scenario.start_time.unwrap()).unwrap()
}

#[tokio::test]
async fn test_basic_scenario_replays() {
    let scenario = load(BASIC);
    let mut runner = runner_for(&scenario);

    let summary = tokio::task::spawn_blocking(move || runner.run(&scenario))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.scenario, "basic lifecycle");
    assert_eq!(summary.steps, 32);
    assert_eq!(summary.rejected_as_expected, 6);
    assert_eq!(summary.fee_period_id, 2);
    assert_eq!(summary.flagged_accounts, 1);
    assert_eq!(summary.queued_exchanges, 0);
    assert_eq!(summary.debt_ledger_len, 6);
    assert!(summary.total_issued_synths.is_some());
    assert!(summary.events > 0);
}

#[tokio::test]
async fn test_reports_carry_step_outputs() {
    let scenario = load(BASIC);
    let mut runner = runner_for(&scenario);
    runner.run(&scenario).unwrap();

    let reports = runner.reports();
    assert_eq!(reports[6].op, "issue");
    let issued = reports[6].output.as_ref().unwrap();
    assert_eq!(issued["amount"], "1000");
    assert_eq!(issued["account"], "alice");

    let rejected = &reports[11];
    assert_eq!(rejected.op, "transfer");
    assert!(rejected.rejected.as_deref().unwrap().contains("sETH"));
}

#[tokio::test]
async fn test_wrong_expectation_stops_run() {
    let scenario = load(
        r#"{
            "name": "mismatch",
            "start_time": 1700000000,
            "steps": [
                { "op": "update_rates", "rates": { "SNX": "1", "sBTC": "10000", "sETH": "200", "iBTC": "10000" } },
                { "op": "fund", "account": "alice", "asset": "SNX", "amount": "1000" },
                { "op": "issue", "account": "alice", "amount": "200", "expect_error": "Waiting period" },
                { "op": "issue", "account": "alice", "amount": "10" }
            ]
        }"#,
    );
    let mut runner = runner_for(&scenario);

    let err = runner.run(&scenario).unwrap_err();
    assert!(matches!(err, ScenarioError::WrongError { index: 2, op: "issue", .. }));
    assert_eq!(runner.reports().len(), 2);
    assert!(runner.system().debt_ledger().is_empty());
}

#[tokio::test]
async fn test_stale_rates_fail_the_run() {
    let scenario = load(
        r#"{
            "name": "stale",
            "start_time": 1700000000,
            "steps": [
                { "op": "update_rates", "rates": { "SNX": "1", "sBTC": "10000", "sETH": "200", "iBTC": "10000" } },
                { "op": "fund", "account": "alice", "asset": "SNX", "amount": "1000" },
                { "op": "advance_time", "secs": 10801 },
                { "op": "issue", "account": "alice", "amount": "10" }
            ]
        }"#,
    );
    let mut runner = runner_for(&scenario);

    let err = runner.run(&scenario).unwrap_err();
    assert!(err.to_string().contains("stale"));
    assert!(matches!(err, ScenarioError::StepFailed { index: 3, .. }));
}
