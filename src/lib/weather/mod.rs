use std::time::Duration;

pub mod cache;
pub mod fetcher;
pub mod refresher;
pub mod types;

pub use cache::WeatherCache;
pub use fetcher::Fetcher;
pub use refresher::{Refresher, RefresherHandle, RefresherState};
pub use types::WeatherReading;

/// How often the weather is fetched, also the age past which a reading is stale.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);
