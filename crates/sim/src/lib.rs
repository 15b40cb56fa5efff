pub mod runner;
pub mod scenario;

pub use runner::{RunSummary, ScenarioError, ScenarioRunner, StepReport};
pub use scenario::{Action, Scenario, Step};
