use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Condition shown before the first successful fetch lands in the cache.
pub const LOADING_CONDITION: &str = "loading...";

/// Condition used when the upstream omits a description.
pub const UNKNOWN_CONDITION: &str = "Unknown";

/// A single weather snapshot.
///
/// The serialized form is also the on-disk cache file format:
/// `{location, temperature, condition, humidity, updated}`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeatherReading {
    pub location: String,
    #[serde(rename = "temperature")]
    pub temperature_c: i64,
    pub condition: String,
    #[serde(rename = "humidity")]
    pub humidity_pct: i64,
    #[serde(rename = "updated")]
    pub updated_at: DateTime<Utc>,
}

impl WeatherReading {
    /// Placeholder reading served during cold start.
    pub fn loading(location: &str) -> Self {
        Self {
            location: location.to_string(),
            temperature_c: 0,
            condition: LOADING_CONDITION.to_string(),
            humidity_pct: 0,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.updated_at)
    }

    /// A reading is stale once it is older than `max_age`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: std::time::Duration) -> bool {
        match Duration::from_std(max_age) {
            Ok(max_age) => self.age(now) > max_age,
            Err(_) => false,
        }
    }
}

impl std::fmt::Display for WeatherReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}°C ({}), humidity {}%",
            self.location, self.temperature_c, self.condition, self.humidity_pct
        )
    }
}
