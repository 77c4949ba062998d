use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Unknown scenario: {name}. Available: {}", .available.join(", "))]
    Unknown {
        name: String,
        available: Vec<&'static str>,
    },
}
