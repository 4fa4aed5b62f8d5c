use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, RwLock},
};
use tracing::*;

use super::{types::WeatherReading, REFRESH_INTERVAL};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to write cache file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize weather reading: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no weather reading to persist yet")]
    Unpopulated,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Last known weather reading, shared between the HTTP handlers and the refresher.
///
/// Readers take the shared lock and get a copy, writers replace the whole
/// reading at once so no reader can observe a half updated value.
#[derive(Debug)]
pub struct WeatherCache {
    location: String,
    path: PathBuf,
    reading: RwLock<Option<WeatherReading>>,
    // Serializes saves so an older snapshot never lands on disk after a newer one
    persist: Mutex<()>,
}

impl WeatherCache {
    pub fn new(location: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            location: location.to_string(),
            path: path.into(),
            reading: RwLock::new(None),
            persist: Mutex::new(()),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current reading, or the "loading..." placeholder if nothing was stored yet.
    pub async fn read(&self) -> WeatherReading {
        match self.reading.read().await.as_ref() {
            Some(reading) => reading.clone(),
            None => WeatherReading::loading(&self.location),
        }
    }

    pub async fn is_populated(&self) -> bool {
        self.reading.read().await.is_some()
    }

    pub async fn update(&self, reading: WeatherReading) {
        *self.reading.write().await = Some(reading);
    }

    /// Missing or unreadable files are expected on first run, they only get logged.
    #[instrument(level = "debug", skip(self), fields(path = ?self.path))]
    pub async fn load_from_disk(&self) -> bool {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(error) => {
                info!("No weather cache file (normal on first run): {error}");
                return false;
            }
        };

        let reading: WeatherReading = match serde_json::from_slice(&contents) {
            Ok(reading) => reading,
            Err(error) => {
                warn!("Corrupt weather cache file, ignoring: {error}");
                return false;
            }
        };

        let now = Utc::now();
        if reading.is_stale(now, REFRESH_INTERVAL) {
            info!(
                "Loaded stale weather cache ({} minutes old): {reading}",
                reading.age(now).num_minutes()
            );
        } else {
            info!("Loaded fresh weather cache: {reading}");
        }

        self.update(reading).await;
        true
    }

    /// Writes the reading next to the cache file and renames it into place.
    #[instrument(level = "debug", skip(self), fields(path = ?self.path))]
    pub async fn save_to_disk(&self) -> Result<(), CacheError> {
        let _persist = self.persist.lock().await;

        let contents = {
            let reading = self.reading.read().await;
            let reading = reading.as_ref().ok_or(CacheError::Unpopulated)?;
            serde_json::to_vec_pretty(reading)?
        };

        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        let temporary_path = temporary_path(&self.path);
        if let Err(error) = write_synced(&temporary_path, &contents).await {
            let _ = tokio::fs::remove_file(&temporary_path).await;
            return Err(error);
        }

        if let Err(source) = tokio::fs::rename(&temporary_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temporary_path).await;
            return Err(CacheError::Io {
                path: self.path.clone(),
                source,
            });
        }

        debug!("Weather cache saved");
        Ok(())
    }
}

/// Sibling of `path`, so the final rename never crosses a filesystem.
pub fn temporary_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

async fn write_synced(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(io_error(path))?;
    file.write_all(contents).await.map_err(io_error(path))?;
    file.sync_all().await.map_err(io_error(path))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration};
    use tempfile::TempDir;
    use tracing_test::traced_test;

    use super::*;
    use crate::weather::types::LOADING_CONDITION;

    /// Cache file inside a directory that is removed when the guard drops.
    pub fn temporary_cache_file() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("weather_cache.json");
        (dir, path)
    }

    fn reading(condition: &str, temperature_c: i64) -> WeatherReading {
        WeatherReading {
            location: "Sleman".into(),
            temperature_c,
            condition: condition.into(),
            humidity_pct: 60,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unpopulated_read_returns_placeholder() {
        let (_dir, path) = temporary_cache_file();
        let cache = WeatherCache::new("Sleman", path);

        let current = cache.read().await;
        assert!(!cache.is_populated().await);
        assert_eq!(current.location, "Sleman");
        assert_eq!(current.temperature_c, 0);
        assert_eq!(current.condition, LOADING_CONDITION);
        assert_eq!(current.humidity_pct, 0);
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let (_dir, path) = temporary_cache_file();
        let stored = WeatherReading {
            updated_at: DateTime::parse_from_rfc3339("2024-05-01T10:15:30.123456789+07:00")
                .unwrap()
                .with_timezone(&Utc),
            ..reading("Partly cloudy", 31)
        };

        let cache = WeatherCache::new("Sleman", &path);
        cache.update(stored.clone()).await;
        cache.save_to_disk().await.unwrap();

        assert!(path.exists());
        assert!(!temporary_path(&path).exists());

        let restored = WeatherCache::new("Sleman", &path);
        assert!(restored.load_from_disk().await);
        assert_eq!(restored.read().await, stored);
    }

    #[tokio::test]
    #[traced_test]
    async fn corrupt_file_leaves_cache_untouched() {
        let (_dir, path) = temporary_cache_file();
        let cache = WeatherCache::new("Sleman", &path);
        let current = reading("Sunny", 28);
        cache.update(current.clone()).await;
        cache.save_to_disk().await.unwrap();

        let contents = std::fs::read(&path).unwrap();
        std::fs::write(&path, &contents[..contents.len() / 2]).unwrap();

        cache.update(reading("Rain", 22)).await;
        let before = cache.read().await;
        assert!(!cache.load_from_disk().await);
        assert_eq!(cache.read().await, before);
        assert!(logs_contain("Corrupt weather cache file"));
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let (_dir, path) = temporary_cache_file();
        let cache = WeatherCache::new("Sleman", path);
        assert!(!cache.load_from_disk().await);
        assert!(!cache.is_populated().await);
    }

    #[tokio::test]
    async fn nothing_to_save_before_first_update() {
        let (_dir, path) = temporary_cache_file();
        let cache = WeatherCache::new("Sleman", &path);

        assert!(matches!(
            cache.save_to_disk().await,
            Err(CacheError::Unpopulated)
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unwritable_location_reports_io_error() {
        let (_dir, blocker) = temporary_cache_file();
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"not a directory").unwrap();

        // The parent of the cache file is a regular file
        let cache = WeatherCache::new("Sleman", blocker.join("weather_cache.json"));
        cache.update(reading("Sunny", 28)).await;

        assert!(matches!(
            cache.save_to_disk().await,
            Err(CacheError::Io { .. })
        ));
        assert_eq!(cache.read().await.condition, "Sunny");
    }

    #[tokio::test]
    async fn stale_file_is_still_loaded() {
        let (_dir, path) = temporary_cache_file();
        let old = WeatherReading {
            updated_at: Utc::now() - Duration::hours(3),
            ..reading("Cloudy", 25)
        };

        let writer = WeatherCache::new("Sleman", &path);
        writer.update(old.clone()).await;
        writer.save_to_disk().await.unwrap();

        let cache = WeatherCache::new("Sleman", &path);
        assert!(cache.load_from_disk().await);
        assert!(cache.read().await.is_stale(Utc::now(), REFRESH_INTERVAL));
    }

    #[tokio::test]
    async fn test_files_are_removed_with_their_directory() {
        let (dir, path) = temporary_cache_file();
        let cache = WeatherCache::new("Sleman", &path);
        cache.update(reading("Sunny", 28)).await;
        cache.save_to_disk().await.unwrap();
        assert!(path.exists());

        let root = dir.path().to_path_buf();
        drop(dir);
        assert!(!root.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_a_torn_reading() {
        let before = WeatherReading {
            location: "Sleman".into(),
            temperature_c: 28,
            condition: "Sunny".into(),
            humidity_pct: 60,
            updated_at: Utc::now(),
        };
        let after = WeatherReading {
            location: "Yogyakarta".into(),
            temperature_c: 19,
            condition: "Thunderstorm".into(),
            humidity_pct: 95,
            updated_at: before.updated_at + Duration::minutes(30),
        };

        let (_dir, path) = temporary_cache_file();
        let cache = Arc::new(WeatherCache::new("Sleman", path));
        cache.update(before.clone()).await;

        let readers: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let mut observed = Vec::with_capacity(200);
                    for _ in 0..200 {
                        observed.push(cache.read().await);
                        tokio::task::yield_now().await;
                    }
                    observed
                })
            })
            .collect();

        tokio::task::yield_now().await;
        cache.update(after.clone()).await;

        for reader in readers {
            for observed in reader.await.unwrap() {
                assert!(
                    observed == before || observed == after,
                    "torn reading: {observed:?}"
                );
            }
        }
        assert_eq!(cache.read().await, after);
    }
}
