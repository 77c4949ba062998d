//! The rate-paced dispatch loop.
//!
//! One control flow issues a request every `1 / requestsPerSecond` seconds until the
//! scenario's deadline. Each request runs in its own task and reports to the
//! [`Aggregator`]; the loop itself never waits on a response.
use crate::aggregator::{Aggregator, AggregatorHandle, DroppedCounter};
use crate::entity::EntityPool;
use crate::error::RunError;
use crate::timer::Timer;
use crate::traits::{PayloadGenerator, Transport};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{
    AggregateStats, Report, RequestResult, Scenario, ScenarioRegistry, DEFAULT_DRAIN_WINDOW,
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_START_DELAY,
};
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};
use url::Url;

const PREVIEW_IDS: usize = 5;

/// Longest run the deadline clock will represent (about 30 years).
const MAX_RUN: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Run parameters that are not part of the load profile itself.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub endpoint: Url,
    pub request_timeout: Duration,
    /// Grace period after the deadline before the aggregate is frozen.
    pub drain_window: Duration,
    /// Zero disables progress logging.
    pub progress_interval: Duration,
    pub start_delay: Duration,
    /// `None` leaves the number of in-flight requests unbounded.
    pub max_in_flight: Option<NonZeroUsize>,
    /// Seeds merchant selection.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            drain_window: DEFAULT_DRAIN_WINDOW,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            start_delay: DEFAULT_START_DELAY,
            max_in_flight: None,
            seed: None,
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn max_in_flight(mut self, max: NonZeroUsize) -> Self {
        self.max_in_flight = Some(max);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// One scheduled request attempt. Lives only until its result is recorded.
#[derive(Debug)]
struct DispatchUnit {
    entity_id: String,
    issued_at: Instant,
}

pub struct Dispatcher<G, T> {
    generator: Arc<G>,
    transport: Arc<T>,
    config: RunConfig,
}

impl<G, T> Dispatcher<G, T>
where
    G: PayloadGenerator,
    T: Transport + Send + Sync + 'static,
{
    pub fn new(generator: G, transport: T, config: RunConfig) -> Self {
        Self {
            generator: Arc::new(generator),
            transport: Arc::new(transport),
            config,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolves `name` and runs it. An unknown name fails before anything is dispatched.
    pub async fn run_named(
        &self,
        registry: &ScenarioRegistry,
        name: &str,
    ) -> Result<RunOutcome, RunError> {
        let scenario = registry.resolve(name)?;
        self.run(&scenario).await
    }

    #[instrument(name = "scenario", skip_all, fields(name = %scenario.name))]
    pub async fn run(&self, scenario: &Scenario) -> Result<RunOutcome, RunError> {
        let pool = EntityPool::generate(scenario.entity_count);
        let mut rng = match self.config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let slots = self
            .config
            .max_in_flight
            .map(|max| Arc::new(Semaphore::new(max.get())));

        self.log_header(scenario, &pool);

        if !self.config.start_delay.is_zero() {
            warn!(
                "Starting in {}...",
                humantime::format_duration(self.config.start_delay)
            );
            tokio::time::sleep(self.config.start_delay).await;
        }

        let aggregator = Aggregator::spawn();
        let dropped = aggregator.dropped();
        let started_at = OffsetDateTime::now_utc();
        let start = Instant::now();
        let deadline = deadline(start, scenario.duration);

        let observer = tokio::spawn(
            observe(aggregator.handle(), self.config.progress_interval, start).in_current_span(),
        );

        // NOTE: This loop is time-sensitive. The only awaits are the pacing tick and,
        // when bounded, a free in-flight slot.
        let mut timer = Timer::new(scenario.interval()).await;
        debug!("Pacing one request every {timer}");
        let mut issued = 0u64;
        while Instant::now() < deadline {
            let permit = match &slots {
                Some(slots) => {
                    let permit = slots.clone().acquire_owned().await?;
                    if Instant::now() >= deadline {
                        break;
                    }
                    Some(permit)
                }
                None => None,
            };

            let unit = DispatchUnit {
                entity_id: pool.pick(&mut rng).to_string(),
                issued_at: Instant::now(),
            };
            self.spawn_unit(unit, aggregator.handle(), permit);
            issued += 1;

            let gap = timer.tick().await;
            if gap > timer.interval_dur() * 2 {
                debug!("Dispatch fell behind, {} between requests", humantime::format_duration(gap));
            }
        }
        observer.abort();

        info!(
            "Dispatch finished after {issued} requests, waiting {} for in-flight requests",
            humantime::format_duration(self.config.drain_window)
        );
        tokio::time::sleep(self.config.drain_window).await;

        let stats = aggregator.finish().await?;
        let finished_at = OffsetDateTime::now_utc();
        let elapsed = start.elapsed();

        let in_flight = issued.saturating_sub(stats.total_requests());
        if in_flight > 0 {
            warn!("{in_flight} requests still in flight after the drain window, their results will be dropped");
        }
        info!(
            "Run complete: {} recorded ({} ok, {} failed) in {}",
            stats.total_requests(),
            stats.successful(),
            stats.failed(),
            humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
        );

        Ok(RunOutcome {
            scenario: scenario.clone(),
            stats,
            issued,
            started_at,
            finished_at,
            elapsed,
            dropped,
        })
    }

    fn spawn_unit(
        &self,
        unit: DispatchUnit,
        sink: AggregatorHandle,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let generator = self.generator.clone();
        let transport = self.transport.clone();
        let endpoint = self.config.endpoint.clone();
        let timeout = self.config.request_timeout;

        tokio::spawn(
            async move {
                let payload = generator.generate(&unit.entity_id, None);
                let sent = transport.send(&endpoint, &payload, timeout).await;
                drop(permit);

                let response_time_ms = unit.issued_at.elapsed().as_secs_f64() * 1_000.;
                let result = match sent {
                    Ok(status) => RequestResult::success(
                        unit.entity_id,
                        response_time_ms,
                        status,
                        Some(payload.event),
                    ),
                    Err(err) => {
                        trace!("{} failed: {err}", unit.entity_id);
                        RequestResult::failure(
                            unit.entity_id,
                            response_time_ms,
                            err.to_string(),
                            err.status_code(),
                            Some(payload.event),
                        )
                    }
                };
                sink.record(result);
            }
            .in_current_span(),
        );
    }

    fn log_header(&self, scenario: &Scenario, pool: &EntityPool) {
        info!("Starting {}: {}", scenario.name, scenario.description);
        info!("Endpoint: {}", self.config.endpoint);
        info!(
            "Merchants: {} | Rate: {} req/s | Duration: {} | Expected requests: {}",
            scenario.entity_count,
            scenario.requests_per_second,
            humantime::format_duration(scenario.duration),
            scenario.expected_requests()
        );

        let preview = pool.ids().iter().take(PREVIEW_IDS).cloned().collect::<Vec<_>>();
        if pool.len() > PREVIEW_IDS {
            info!(
                "Merchant IDs: {} ... and {} more",
                preview.join(", "),
                pool.len() - PREVIEW_IDS
            );
        } else {
            info!("Merchant IDs: {}", preview.join(", "));
        }
    }
}

/// `start + duration`, held to [`MAX_RUN`] past `start` so a huge duration cannot overflow.
fn deadline(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration.min(MAX_RUN))
        .unwrap_or(start + MAX_RUN)
}

async fn observe(sink: AggregatorHandle, every: Duration, start: Instant) {
    if every.is_zero() {
        return;
    }

    let mut timer = Timer::new(every).await;
    loop {
        timer.tick().await;
        let elapsed = start.elapsed().as_secs_f64();
        let progress = sink.progress();
        info!(
            "{elapsed:.1}s | Requests: {} | Success: {} | Failed: {} | Rate: {:.1} req/s",
            progress.total,
            progress.successful,
            progress.failed,
            progress.rate(elapsed)
        );
    }
}

/// Everything a finished run hands back.
#[derive(Debug)]
pub struct RunOutcome {
    pub scenario: Scenario,
    /// The aggregate as frozen at the end of the drain window.
    pub stats: AggregateStats,
    pub issued: u64,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub elapsed: Duration,
    dropped: DroppedCounter,
}

impl RunOutcome {
    pub fn report(&self) -> Report {
        Report::build(&self.stats, &self.scenario, self.elapsed)
    }

    /// Completions that arrived after the freeze so far. Grows while stragglers finish.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::WebhookGenerator;
    use crate::traits::{Payload, TransportError};
    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use surge_core::{CustomProfile, ScenarioError, ScenarioKind};

    fn scenario(entities: usize, rps: u32, secs: u64) -> Scenario {
        ScenarioKind::Custom.profile(&CustomProfile {
            entity_count: NonZeroUsize::new(entities).unwrap(),
            requests_per_second: NonZeroU32::new(rps).unwrap(),
            duration: Duration::from_secs(secs),
        })
    }

    fn config() -> RunConfig {
        RunConfig::new("http://localhost:3000/webhook".parse().unwrap())
            .start_delay(Duration::ZERO)
            .drain_window(Duration::from_secs(1))
    }

    fn dispatcher<T>(transport: T, config: RunConfig) -> Dispatcher<WebhookGenerator, T>
    where
        T: Transport + Send + Sync + 'static,
    {
        Dispatcher::new(WebhookGenerator::new(), transport, config)
    }

    #[derive(Default)]
    struct Instant200 {
        calls: AtomicUsize,
    }

    impl Transport for Instant200 {
        async fn send(&self, _: &Url, _: &Payload, _: Duration) -> Result<u16, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(200)
        }
    }

    /// Sleeps through the given latencies in turn, failing every `fail_every`th call.
    struct Scripted {
        latencies_ms: Vec<u64>,
        fail_every: Option<usize>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Scripted {
        fn new(latencies_ms: Vec<u64>) -> Self {
            Self {
                latencies_ms,
                fail_every: None,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing_every(mut self, n: usize) -> Self {
            self.fail_every = Some(n);
            self
        }
    }

    impl Transport for Scripted {
        async fn send(&self, _: &Url, _: &Payload, _: Duration) -> Result<u16, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let latency = self.latencies_ms[call % self.latencies_ms.len()];
            tokio::time::sleep(Duration::from_millis(latency)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.fail_every {
                Some(n) if (call + 1) % n == 0 => Err(TransportError::Status(503)),
                _ => Ok(200),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn issues_rate_times_duration() {
        let dispatcher = dispatcher(Instant200::default(), config().seed(42));
        let outcome = dispatcher.run(&scenario(3, 10, 2)).await.unwrap();

        assert_eq!(outcome.issued, 20);
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 20);
        assert_eq!(outcome.stats.total_requests(), 20);
        assert_eq!(outcome.stats.successful(), 20);
        assert!(outcome.stats.is_consistent());
        assert_eq!(outcome.dropped(), 0);

        let report = outcome.report();
        assert_eq!(report.success_rate, 100.);
        assert_eq!(report.expected_requests, 20);
        // Two seconds of dispatch plus the one second drain window.
        assert!((3.0..3.1).contains(&report.actual_duration_seconds));
    }

    #[tokio::test(start_paused = true)]
    async fn latencies_are_measured_from_issue() {
        let dispatcher = dispatcher(Scripted::new(vec![10, 20, 30, 40]), config());
        let outcome = dispatcher.run(&scenario(2, 4, 1)).await.unwrap();
        let report = outcome.report();

        assert_eq!(report.total_requests, 4);
        assert!((report.avg_response_time - 25.).abs() < 1.);
        assert!((report.min_response_time - 10.).abs() < 1.);
        assert!((report.max_response_time - 40.).abs() < 1.);
        assert_eq!(
            report.per_entity_breakdown.iter().map(|e| e.total).sum::<u64>(),
            4
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_and_never_retried() {
        let transport = Scripted::new(vec![5]).failing_every(2);
        let dispatcher = dispatcher(transport, config());
        let outcome = dispatcher.run(&scenario(5, 10, 1)).await.unwrap();

        assert_eq!(outcome.issued, 10);
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 10);
        assert_eq!(outcome.stats.failed(), 5);
        assert_eq!(outcome.stats.successful(), 5);
        assert!(outcome.stats.is_consistent());

        let error = &outcome.stats.errors()[0];
        assert_eq!(error.message, "Request failed with status code 503");
        assert_eq!(error.status_code, Some(503));
        assert_eq!(
            outcome.report().error_counts(),
            vec![("Request failed with status code 503".to_string(), 5)]
        );
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn completions_after_drain_are_dropped() {
        let dispatcher = dispatcher(Scripted::new(vec![10_000]), config());
        let outcome = dispatcher.run(&scenario(2, 2, 1)).await.unwrap();

        assert_eq!(outcome.issued, 2);
        assert_eq!(outcome.stats.total_requests(), 0);
        assert_eq!(outcome.dropped(), 0);
        assert!(logs_contain("2 requests still in flight"));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(outcome.dropped(), 2);
        assert!(outcome.report().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_and_fast_completions_split_at_the_freeze() {
        let dispatcher = dispatcher(Scripted::new(vec![5, 10_000]), config());
        let outcome = dispatcher.run(&scenario(2, 4, 1)).await.unwrap();

        assert_eq!(outcome.issued, 4);
        assert_eq!(outcome.stats.total_requests(), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(outcome.stats.total_requests() + outcome.dropped(), outcome.issued);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_scenario_dispatches_nothing() {
        let dispatcher = dispatcher(Instant200::default(), config());
        let err = dispatcher
            .run_named(&ScenarioRegistry::default(), "nope")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Scenario(ScenarioError::Unknown { ref name, .. }) if name == "nope"
        ));
        assert_eq!(dispatcher.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_bound_holds_back_issuance() {
        let config = config().max_in_flight(NonZeroUsize::new(2).unwrap());
        let dispatcher = dispatcher(Scripted::new(vec![1_000]), config);
        let outcome = dispatcher.run(&scenario(2, 10, 1)).await.unwrap();

        assert_eq!(dispatcher.transport().max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.issued, 2);
        assert_eq!(outcome.stats.total_requests(), 2);
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn huge_custom_duration_is_clamped() {
        let max = u64::MAX.to_string();
        let custom = CustomProfile::from_lookup(|key| {
            (key == "DURATION_SECONDS").then(|| max.clone())
        });
        let scenario = ScenarioRegistry::new(custom).resolve("custom").unwrap();
        let dispatcher = dispatcher(Instant200::default(), config());

        dispatcher.log_header(&scenario, &EntityPool::generate(scenario.entity_count));
        assert!(logs_contain(&format!("Expected requests: {}", u64::MAX)));

        let start = Instant::now();
        assert_eq!(deadline(start, scenario.duration), start + MAX_RUN);
        assert_eq!(
            deadline(start, Duration::from_secs(2)),
            start + Duration::from_secs(2)
        );
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn progress_is_logged_while_running() {
        let config = config().progress_interval(Duration::from_millis(500));
        let dispatcher = dispatcher(Instant200::default(), config);
        dispatcher.run(&scenario(12, 10, 2)).await.unwrap();

        assert!(logs_contain("Merchant IDs: merchant_0001"));
        assert!(logs_contain("... and 7 more"));
        assert!(logs_contain("req/s"));
        assert!(logs_contain("1.0s | Requests:"));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_runs_pick_the_same_merchants() {
        let run = |seed| async move {
            let dispatcher = dispatcher(Instant200::default(), config().seed(seed));
            let outcome = dispatcher.run(&scenario(10, 20, 1)).await.unwrap();
            outcome
                .report()
                .per_entity_breakdown
                .into_iter()
                .map(|e| (e.entity_id, e.total))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(9).await, run(9).await);
    }
}
