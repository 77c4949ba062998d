use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};
use std::time::Duration;

/// Grace period after the deadline before the aggregate is frozen.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_secs(5);

/// How often the progress observer logs a snapshot.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Countdown before the run clock starts.
pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(3);

/// Per-request transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Timeout used by the single-event connection check.
pub const CHECK_REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/webhook";

pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// Environment variables feeding the `custom` scenario.
pub const MERCHANT_COUNT_VAR: &str = "MERCHANT_COUNT";
pub const REQUESTS_PER_SECOND_VAR: &str = "REQUESTS_PER_SECOND";
pub const DURATION_SECONDS_VAR: &str = "DURATION_SECONDS";

pub const DEFAULT_CUSTOM_ENTITY_COUNT: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(count) => count,
    None => panic!("entity count must be non-zero"),
};
pub const DEFAULT_CUSTOM_RPS: NonZeroU32 = match NonZeroU32::new(50) {
    Some(rps) => rps,
    None => panic!("rate must be non-zero"),
};
pub const DEFAULT_CUSTOM_DURATION_SECS: NonZeroU64 = match NonZeroU64::new(60) {
    Some(secs) => secs,
    None => panic!("duration must be non-zero"),
};

/// Prefix of every generated entity id (`merchant_0001`, ...).
pub const ENTITY_ID_PREFIX: &str = "merchant_";
