use surge_core::ScenarioError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("Aggregator task failed: {0}")]
    AggregatorFailed(#[from] tokio::task::JoinError),

    #[error("In-flight slots closed unexpectedly.")]
    SlotsClosed(#[from] tokio::sync::AcquireError),
}
