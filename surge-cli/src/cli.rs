use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use surge::surge_core::{
    DEFAULT_DRAIN_WINDOW, DEFAULT_ENDPOINT, DEFAULT_REPORTS_DIR, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_START_DELAY,
};
use surge::prelude::RunConfig;
use url::Url;

/// Rate-paced webhook load tester.
///
/// `surge heavy` runs a scenario, `surge list` shows them all and `surge check` sends a single
/// test event.
#[derive(Parser, Debug)]
#[command(name = "surge", version, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a load test scenario.
    Run(RunArgs),
    /// List the available scenarios.
    List,
    /// Send one `order.created` event to the endpoint.
    Check(TargetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Webhook URL to load.
    #[arg(short, long, env = "WEBHOOK_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Url,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// light, medium, heavy, stress or custom (case-insensitive).
    #[arg(default_value = "light")]
    pub scenario: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Directory the JSON and Markdown reports are written to.
    #[arg(long, env = "SURGE_REPORTS_DIR", default_value = DEFAULT_REPORTS_DIR)]
    pub reports_dir: PathBuf,

    /// Skip writing report files.
    #[arg(long)]
    pub no_report: bool,

    /// Seconds to wait for in-flight requests after the last one is issued.
    #[arg(long, env = "SURGE_DRAIN_SECS", default_value_t = DEFAULT_DRAIN_WINDOW.as_secs())]
    pub drain_secs: u64,

    #[arg(long, env = "SURGE_START_DELAY_SECS", default_value_t = DEFAULT_START_DELAY.as_secs())]
    pub start_delay_secs: u64,

    /// Per-request timeout.
    #[arg(long, env = "SURGE_TIMEOUT_MS", default_value_t = DEFAULT_REQUEST_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,

    /// Cap on concurrently outstanding requests. Unbounded when unset.
    #[arg(long, env = "SURGE_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<NonZeroUsize>,

    /// Seed for merchant selection.
    #[arg(long, env = "SURGE_SEED")]
    pub seed: Option<u64>,

    /// Serve Prometheus metrics on this address while the run is going.
    #[arg(long, env = "SURGE_PROMETHEUS")]
    pub prometheus: Option<SocketAddr>,
}

impl RunArgs {
    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(self.target.endpoint.clone())
            .drain_window(Duration::from_secs(self.drain_secs))
            .start_delay(Duration::from_secs(self.start_delay_secs))
            .request_timeout(Duration::from_millis(self.timeout_ms));
        if let Some(max) = self.max_in_flight {
            config = config.max_in_flight(max);
        }
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }
        config
    }
}
