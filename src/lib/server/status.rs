use serde::{Deserialize, Serialize};

use crate::{
    stats::host::{self, HostEntry},
    weather::{WeatherCache, WeatherReading},
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeatherStatus {
    pub location: String,
    pub temperature: i64,
    pub condition: String,
    pub humidity: i64,
}

impl From<WeatherReading> for WeatherStatus {
    fn from(reading: WeatherReading) -> Self {
        Self {
            location: reading.location,
            temperature: reading.temperature_c,
            condition: reading.condition,
            humidity: reading.humidity_pct,
        }
    }
}

/// Document shown on the dashboard and in the status fragment.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusJson {
    pub host: Vec<HostEntry>,
    pub weather: WeatherStatus,
}

impl StatusJson {
    pub async fn collect(cache: &WeatherCache) -> Self {
        Self {
            host: vec![host::host_info()],
            weather: cache.read().await.into(),
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
