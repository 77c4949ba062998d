//! Rate-paced webhook load testing.
//!
//! A [`Dispatcher`](dispatcher::Dispatcher) fires synthetic events at a fixed cadence for the
//! duration of a [`Scenario`], never waiting on responses. Completions flow into an
//! [`Aggregator`](aggregator::Aggregator) task that owns all run state, and once the drain
//! window has elapsed the frozen aggregate becomes a [`Report`].
//!
//! ```no_run
//! use surge::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let scenario = ScenarioRegistry::from_env().resolve("light")?;
//!     let config = RunConfig::new("http://localhost:3000/webhook".parse()?);
//!     let dispatcher = Dispatcher::new(WebhookGenerator::new(), HttpTransport::new()?, config);
//!
//!     let outcome = dispatcher.run(&scenario).await?;
//!     let report = outcome.report();
//!     println!("{}", surge::report::render_summary(&report, &scenario));
//!     Ok(())
//! }
//! ```
pub mod aggregator;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod payload;
pub mod report;
pub mod traits;
pub mod transport;

mod timer;

pub use surge_core;
pub use surge_core::{Report, Scenario, ScenarioRegistry};

pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, RunConfig, RunOutcome};
    pub use crate::entity::EntityPool;
    pub use crate::error::RunError;
    pub use crate::payload::WebhookGenerator;
    pub use crate::report::ReportWriter;
    pub use crate::traits::{Payload, PayloadGenerator, Transport, TransportError};
    pub use crate::transport::HttpTransport;
    pub use surge_core::{
        AggregateStats, CustomProfile, Report, RequestResult, Scenario, ScenarioError,
        ScenarioKind, ScenarioRegistry,
    };
}
