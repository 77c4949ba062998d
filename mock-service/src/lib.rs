//! Webhook receiver used as the load target in integration tests and local runs.
use axum::{debug_handler, extract::Path, http::StatusCode, routing::post, Json, Router};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub fn router() -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/delay/ms/:delay_ms", post(delay))
        .route("/jitter/ms/:mean_ms", post(jitter))
        .route("/status/:code", post(status))
        .route("/limited/:max_tps/scenario/:scenario_name", post(limited))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock webhook receiver listening on {addr}");
    axum::serve(listener, router()).await?;
    Ok(())
}

/// Total webhooks accepted since start-up.
pub fn received() -> u64 {
    RECEIVED.load(Ordering::Relaxed)
}

static RECEIVED: AtomicU64 = AtomicU64::new(0);

fn accept(body: &Value) -> Result<Json<Value>, StatusCode> {
    TPS_MEASURE.fetch_add(1, Ordering::Relaxed);
    counter!("mock-service.received").increment(1);

    let Some(event) = body.get("event").and_then(Value::as_str) else {
        debug!("Rejecting webhook without an event");
        return Err(StatusCode::BAD_REQUEST);
    };
    RECEIVED.fetch_add(1, Ordering::Relaxed);
    Ok(Json(json!({ "received": true, "event": event })))
}

#[debug_handler]
pub async fn webhook(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    accept(&body)
}

#[debug_handler]
pub async fn delay(
    Path(delay_ms): Path<u64>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    accept(&body)
}

#[debug_handler]
pub async fn jitter(
    Path(mean_ms): Path<f64>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let delay_ms = Normal::new(mean_ms, mean_ms / 4.)
        .map(|normal| normal.sample(&mut rand::thread_rng()).max(0.))
        .unwrap_or(mean_ms);
    histogram!("mock-service.jitter_ms").record(delay_ms);
    tokio::time::sleep(Duration::from_secs_f64(delay_ms / 1_000.)).await;
    accept(&body)
}

#[debug_handler]
pub async fn status(
    Path(code): Path<u16>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let accepted = accept(&body)?;
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if code.is_success() {
        Ok((code, accepted))
    } else {
        Err(code)
    }
}

lazy_static! {
    static ref LIMITED_MAP: Arc<RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Accepts up to `max_tps` per second per scenario name, answering 429 beyond that.
#[debug_handler]
pub async fn limited(
    Path((max_tps, scenario_name)): Path<(u32, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let read = LIMITED_MAP
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&scenario_name)
        .cloned();
    let limiter = if let Some(limiter) = read {
        limiter
    } else {
        let limiter = Arc::new(rate_limiter(max_tps));
        LIMITED_MAP
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scenario_name)
            .or_insert(limiter)
            .clone()
    };

    match limiter.check() {
        Ok(_) => accept(&body),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

/** Utils **/

pub fn rate_limiter(tps: u32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(tps).unwrap_or(NonZeroU32::MIN),
    ))
}

/** TPS Printer **/

static TPS_MEASURE: AtomicU64 = AtomicU64::new(0);

pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let transactions = TPS_MEASURE.fetch_min(0, Ordering::Relaxed);
        if transactions > 0 {
            info!("{transactions} webhooks/s");
        }
        gauge!("mock-service.tps").set(transactions as f64);
    }
}
