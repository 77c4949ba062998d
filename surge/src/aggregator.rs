//! Single-owner aggregation of request results.
//!
//! One task owns the [`AggregateStats`] and applies results as they arrive over an unbounded
//! channel, so every update is atomic with respect to every reader. Progress observers read a
//! [`Progress`] snapshot that the task republishes after each update.
use arc_swap::ArcSwap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use surge_core::{AggregateStats, Progress, RequestResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

/// Owner side of the aggregation task.
pub struct Aggregator {
    handle: AggregatorHandle,
    freeze: oneshot::Sender<()>,
    task: JoinHandle<AggregateStats>,
}

/// Cloneable sink handed to every in-flight request.
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<RequestResult>,
    progress: Arc<ArcSwap<Progress>>,
    dropped: DroppedCounter,
}

/// Count of results that arrived after the aggregate was frozen. Keeps counting for as long
/// as straggling requests are still completing.
#[derive(Clone, Debug, Default)]
pub struct DroppedCounter(Arc<AtomicU64>);

impl DroppedCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

impl Aggregator {
    /// Spawns the aggregation task on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (freeze, freeze_rx) = oneshot::channel();
        let progress = Arc::new(ArcSwap::from_pointee(Progress::default()));

        let task = tokio::spawn(
            aggregate(rx, freeze_rx, progress.clone()).in_current_span(),
        );

        Self {
            handle: AggregatorHandle {
                tx,
                progress,
                dropped: DroppedCounter::default(),
            },
            freeze,
            task,
        }
    }

    pub fn handle(&self) -> AggregatorHandle {
        self.handle.clone()
    }

    pub fn progress(&self) -> Progress {
        self.handle.progress()
    }

    pub fn dropped(&self) -> DroppedCounter {
        self.handle.dropped.clone()
    }

    /// Stops accepting results, applies everything already queued and returns the frozen
    /// aggregate. Any later [`AggregatorHandle::record`] is counted as dropped.
    pub async fn finish(self) -> Result<AggregateStats, tokio::task::JoinError> {
        // NOTE: A send error means the task already exited, which `await` below surfaces.
        let _ = self.freeze.send(());
        self.task.await
    }
}

impl AggregatorHandle {
    /// Hands a result to the aggregation task. Never blocks.
    pub fn record(&self, result: RequestResult) {
        if let Err(mpsc::error::SendError(late)) = self.tx.send(result) {
            self.dropped.increment();
            debug!("Dropping late result for {}", late.entity_id);
        }
    }

    /// Latest consistent view of the global counters.
    pub fn progress(&self) -> Progress {
        **self.progress.load()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

async fn aggregate(
    mut rx: mpsc::UnboundedReceiver<RequestResult>,
    mut freeze: oneshot::Receiver<()>,
    progress: Arc<ArcSwap<Progress>>,
) -> AggregateStats {
    let mut stats = AggregateStats::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut freeze => {
                rx.close();
                while let Some(result) = rx.recv().await {
                    apply(&mut stats, result, &progress);
                }
                break;
            }
            result = rx.recv() => match result {
                Some(result) => apply(&mut stats, result, &progress),
                None => break,
            },
        }
    }

    trace!("Aggregate frozen at {} results", stats.total_requests());
    stats
}

fn apply(stats: &mut AggregateStats, result: RequestResult, progress: &ArcSwap<Progress>) {
    #[cfg(feature = "metrics")]
    {
        metrics::histogram!("surge_response_time_ms").record(result.response_time_ms);
        if result.success {
            metrics::counter!("surge_requests_success").increment(1);
        } else {
            metrics::counter!("surge_requests_error").increment(1);
        }
    }

    stats.record(result);
    progress.store(Arc::new(stats.progress()));
}
