//! Named load profiles and the registry that resolves them.
use crate::{
    ScenarioError, DEFAULT_CUSTOM_DURATION_SECS, DEFAULT_CUSTOM_ENTITY_COUNT, DEFAULT_CUSTOM_RPS,
    DURATION_SECONDS_VAR, MERCHANT_COUNT_VAR, REQUESTS_PER_SECOND_VAR,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// An immutable load profile.
///
/// Every numeric field is non-zero, so a resolved scenario always describes a runnable test.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    pub entity_count: NonZeroUsize,
    pub requests_per_second: NonZeroU32,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "durationSeconds")]
    pub duration: Duration,
    pub description: String,
}

impl Scenario {
    /// Fixed gap between two issued requests (`1000 / requestsPerSecond` ms).
    pub fn interval(&self) -> Duration {
        Duration::from_nanos((1_000_000_000 / u64::from(self.requests_per_second.get())).max(1))
    }

    /// Number of requests a perfectly paced run would issue.
    pub fn expected_requests(&self) -> u64 {
        u64::from(self.requests_per_second.get()).saturating_mul(self.duration.as_secs())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} merchants, {} req/s, {})",
            self.name,
            self.entity_count,
            self.requests_per_second,
            humantime::format_duration(self.duration)
        )
    }
}

/// The closed set of profiles the registry knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    Light,
    Medium,
    Heavy,
    Stress,
    Custom,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 5] = [
        ScenarioKind::Light,
        ScenarioKind::Medium,
        ScenarioKind::Heavy,
        ScenarioKind::Stress,
        ScenarioKind::Custom,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ScenarioKind::Light => "light",
            ScenarioKind::Medium => "medium",
            ScenarioKind::Heavy => "heavy",
            ScenarioKind::Stress => "stress",
            ScenarioKind::Custom => "custom",
        }
    }

    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(ScenarioKind::key).collect()
    }

    /// Builds the profile for this kind. Only `Custom` reads from `custom`.
    pub fn profile(&self, custom: &CustomProfile) -> Scenario {
        match self {
            ScenarioKind::Light => fixed(
                "Light Load",
                5,
                10,
                30,
                "Low traffic simulation with 5 merchants",
            ),
            ScenarioKind::Medium => fixed(
                "Medium Load",
                10,
                50,
                60,
                "Moderate traffic simulation with 10 merchants",
            ),
            ScenarioKind::Heavy => fixed(
                "Heavy Load",
                20,
                100,
                60,
                "High traffic simulation with 20 merchants",
            ),
            ScenarioKind::Stress => fixed(
                "Stress Test",
                50,
                200,
                120,
                "Maximum load stress test with 50 merchants",
            ),
            ScenarioKind::Custom => Scenario {
                name: "Custom Test".to_string(),
                entity_count: custom.entity_count,
                requests_per_second: custom.requests_per_second,
                duration: custom.duration,
                description: "Custom configuration from environment variables".to_string(),
            },
        }
    }
}

impl FromStr for ScenarioKind {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == lowered)
            .ok_or_else(|| ScenarioError::Unknown {
                name: s.to_string(),
                available: Self::keys(),
            })
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn fixed(name: &str, entities: usize, rps: u32, secs: u64, description: &str) -> Scenario {
    // NOTE: Only called with the literal table values above, all non-zero.
    Scenario {
        name: name.to_string(),
        entity_count: NonZeroUsize::new(entities).unwrap_or(DEFAULT_CUSTOM_ENTITY_COUNT),
        requests_per_second: NonZeroU32::new(rps).unwrap_or(DEFAULT_CUSTOM_RPS),
        duration: Duration::from_secs(secs),
        description: description.to_string(),
    }
}

/// Externally supplied fields of the `custom` scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomProfile {
    pub entity_count: NonZeroUsize,
    pub requests_per_second: NonZeroU32,
    pub duration: Duration,
}

impl Default for CustomProfile {
    fn default() -> Self {
        Self {
            entity_count: DEFAULT_CUSTOM_ENTITY_COUNT,
            requests_per_second: DEFAULT_CUSTOM_RPS,
            duration: Duration::from_secs(DEFAULT_CUSTOM_DURATION_SECS.get()),
        }
    }
}

impl CustomProfile {
    /// Reads `MERCHANT_COUNT`, `REQUESTS_PER_SECOND` and `DURATION_SECONDS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Missing, unparsable or zero values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let duration_secs: Option<NonZeroU64> = parse_var(DURATION_SECONDS_VAR, &lookup);
        Self {
            entity_count: parse_var(MERCHANT_COUNT_VAR, &lookup).unwrap_or(defaults.entity_count),
            requests_per_second: parse_var(REQUESTS_PER_SECOND_VAR, &lookup)
                .unwrap_or(defaults.requests_per_second),
            duration: duration_secs
                .map(|secs| Duration::from_secs(secs.get()))
                .unwrap_or(defaults.duration),
        }
    }
}

fn parse_var<T, F>(key: &str, lookup: &F) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {key}={raw:?}; using the default.");
            None
        }
    }
}

/// Resolves scenario names to profiles.
#[derive(Clone, Debug, Default)]
pub struct ScenarioRegistry {
    custom: CustomProfile,
}

impl ScenarioRegistry {
    pub fn new(custom: CustomProfile) -> Self {
        Self { custom }
    }

    pub fn from_env() -> Self {
        Self::new(CustomProfile::from_env())
    }

    /// Case-insensitive lookup. Fails with [`ScenarioError::Unknown`] for anything not in the
    /// table.
    pub fn resolve(&self, name: &str) -> Result<Scenario, ScenarioError> {
        let kind: ScenarioKind = name.parse()?;
        Ok(kind.profile(&self.custom))
    }

    /// Every profile, keyed, in table order.
    pub fn list(&self) -> Vec<(&'static str, Scenario)> {
        ScenarioKind::ALL
            .iter()
            .map(|kind| (kind.key(), kind.profile(&self.custom)))
            .collect()
    }
}
