use synth_common::clock::{Clock, SystemClock};
use synth_common::config::EngineConfig;
use synth_sim::{Scenario, ScenarioRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "synth_sim=info,synth_engine=info,synth_oracle=info".into()),
        )
        .json()
        .init();

    tracing::info!("Synth ledger simulator starting...");

    let config = EngineConfig::from_env()?;

    let path = std::env::var("SIM_SCENARIO")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .ok_or_else(|| anyhow::anyhow!("usage: synth-sim <scenario.json> (or set SIM_SCENARIO)"))?;
    let raw = tokio::fs::read_to_string(&path).await?;
    let scenario = Scenario::from_json(&raw)?;
    let start = scenario.start_time.unwrap_or_else(|| SystemClock.now());

    tracing::info!(
        path = %path,
        scenario = %scenario.name,
        description = scenario.description.as_deref().unwrap_or(""),
        "Scenario loaded"
    );

    let mut runner = ScenarioRunner::new(config, start)?;
    let replay = tokio::task::spawn_blocking(move || runner.run(&scenario));

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = replay => {
            match result? {
                Ok(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scenario failed");
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Synth ledger simulator stopped.");
    Ok(())
}
