use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::OnceLock;
use std::time::Duration;
use surge::prelude::*;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

pub const MOCK_ADDR: &str = "127.0.0.1:3003";

#[allow(unused)]
pub async fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("surge=debug,mock_service=debug,axum::rejection=trace")
            .init();

        // NOTE: The mock service and exporter get their own runtime so they outlive the
        // runtime of whichever test called `init` first.
        std::thread::spawn(|| {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                PrometheusBuilder::new()
                    .with_http_listener("127.0.0.1:8003".parse::<SocketAddr>().unwrap())
                    .install()
                    .unwrap();

                let addr: SocketAddr = MOCK_ADDR.parse().unwrap();
                mock_service::run(addr).await.unwrap();
            });
        });
    });

    while tokio::net::TcpStream::connect(MOCK_ADDR).await.is_err() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[allow(unused)]
pub fn endpoint(path: &str) -> Url {
    format!("http://{MOCK_ADDR}{path}").parse().unwrap()
}

/// A custom scenario, sized for tests.
#[allow(unused)]
pub fn scenario(entities: usize, rps: u32, secs: u64) -> Scenario {
    ScenarioKind::Custom.profile(&CustomProfile {
        entity_count: NonZeroUsize::new(entities).unwrap(),
        requests_per_second: NonZeroU32::new(rps).unwrap(),
        duration: Duration::from_secs(secs),
    })
}

#[allow(unused)]
pub fn dispatcher(
    path: &str,
    drain: Duration,
) -> anyhow::Result<Dispatcher<WebhookGenerator, HttpTransport>> {
    let config = RunConfig::new(endpoint(path))
        .start_delay(Duration::ZERO)
        .drain_window(drain)
        .request_timeout(Duration::from_secs(2));
    Ok(Dispatcher::new(WebhookGenerator::new(), HttpTransport::new()?, config))
}
