mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{Cli, Command, RunArgs, TargetArgs};
use metrics_exporter_prometheus::PrometheusBuilder;
use surge::surge_core::CHECK_REQUEST_TIMEOUT;
use surge::payload::ORDER_CREATED;
use surge::prelude::*;
use surge::report::print_summary;
use time::OffsetDateTime;
#[allow(unused)]
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CHECK_MERCHANT: &str = "test_merchant_001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("surge=info")),
        )
        .init();

    match cli.command {
        Some(Command::List) => {
            list();
            Ok(())
        }
        Some(Command::Check(target)) => check(target).await,
        Some(Command::Run(args)) => run(args).await,
        None => run(cli.run).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    // NOTE: Unknown names fail here, before the exporter or the client exist.
    let scenario = ScenarioRegistry::from_env().resolve(&args.scenario)?;

    if let Some(addr) = args.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start the Prometheus exporter")?;
        info!("Serving metrics on {addr}");
    }

    let dispatcher = Dispatcher::new(
        WebhookGenerator::new(),
        HttpTransport::new()?,
        args.run_config(),
    );
    let outcome = dispatcher.run(&scenario).await?;
    let report = outcome.report();

    if !args.no_report {
        let paths = ReportWriter::new(&args.reports_dir).write(
            &report,
            &scenario,
            OffsetDateTime::now_utc(),
        )?;
        info!(
            "Reports written to {} and {}",
            paths.json.display(),
            paths.markdown.display()
        );
    }
    print_summary(&report, &scenario);

    if outcome.dropped() > 0 {
        warn!("{} results arrived after the drain window", outcome.dropped());
    }
    Ok(())
}

fn list() {
    println!("\nAvailable test scenarios:\n");
    for (key, scenario) in ScenarioRegistry::from_env().list() {
        println!("  {key:<8} {scenario}");
        println!("           {}\n", scenario.description);
    }
}

async fn check(target: TargetArgs) -> anyhow::Result<()> {
    info!("Endpoint: {}", target.endpoint);
    let payload = WebhookGenerator::new().generate(CHECK_MERCHANT, Some(ORDER_CREATED));

    info!("Sending test {} payload...", payload.event);
    match HttpTransport::new()?
        .send(&target.endpoint, &payload, CHECK_REQUEST_TIMEOUT)
        .await
    {
        Ok(status) => {
            info!("Success! Status: {status}");
            Ok(())
        }
        Err(err) => {
            error!("Connection failed!");
            bail!(err)
        }
    }
}
