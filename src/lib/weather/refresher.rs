use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::{
    cache::WeatherCache,
    fetcher::{FetchError, Fetcher},
    types::WeatherReading,
    REFRESH_INTERVAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherState {
    Running,
    Stopped,
}

/// Fetches a new reading on a fixed interval and stores it in the cache.
pub struct Refresher {
    fetcher: Arc<Fetcher>,
    cache: Arc<WeatherCache>,
    interval: Duration,
}

impl Refresher {
    pub fn new(fetcher: Arc<Fetcher>, cache: Arc<WeatherCache>) -> Self {
        Self {
            fetcher,
            cache,
            interval: REFRESH_INTERVAL,
        }
    }

    /// A zero interval cannot drive a ticker, it is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("Ignoring zero weather refresh interval, keeping {:?}", self.interval);
            return self;
        }

        self.interval = interval;
        self
    }

    pub fn cache(&self) -> &Arc<WeatherCache> {
        &self.cache
    }

    /// Fetch, replace the cached reading and persist it.
    ///
    /// A failed save is logged and the in-memory reading is kept.
    #[instrument(level = "debug", skip(self))]
    pub async fn refresh(&self) -> Result<WeatherReading, FetchError> {
        let mut reading = self.fetcher.fetch().await?;

        // Keep updated_at increasing even if the wall clock steps back
        if self.cache.is_populated().await {
            let previous = self.cache.read().await.updated_at;
            if reading.updated_at <= previous {
                reading.updated_at = previous + chrono::Duration::nanoseconds(1);
            }
        }

        self.cache.update(reading.clone()).await;

        match self.cache.save_to_disk().await {
            Ok(()) => info!("Weather updated: {reading}"),
            Err(error) => error!("Failed to save weather cache: {error}"),
        }

        Ok(reading)
    }

    async fn refresh_logged(&self) {
        if let Err(error) = self.refresh().await {
            error!("Weather update failed: {error}");
        }
    }

    /// Restore the cache from disk, fetching right away when it is missing,
    /// corrupt or stale.
    #[instrument(level = "debug", skip(self))]
    pub async fn bootstrap(&self) {
        if !self.cache.load_from_disk().await {
            info!("No valid cache found, fetching weather...");
            self.refresh_logged().await;
            return;
        }

        if self.cache.read().await.is_stale(Utc::now(), self.interval) {
            info!("Cache is stale, fetching fresh weather...");
            self.refresh_logged().await;
        }
    }

    pub fn spawn(self, token: CancellationToken) -> RefresherHandle {
        let (state_sender, state) = watch::channel(RefresherState::Running);
        let task = tokio::spawn(self.run(token.clone(), state_sender));

        RefresherHandle { token, state, task }
    }

    async fn run(self, token: CancellationToken, state: watch::Sender<RefresherState>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = self.refresh_logged() => {}
                    }
                }
            }
        }

        info!("Weather refresher stopped");
        let _ = state.send(RefresherState::Stopped);
    }
}

pub struct RefresherHandle {
    token: CancellationToken,
    state: watch::Receiver<RefresherState>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    pub fn state(&self) -> RefresherState {
        *self.state.borrow()
    }

    /// Cancel the loop and wait up to `timeout` for it to finish.
    /// Returns false if the task had to be abandoned.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(self, timeout: Duration) -> bool {
        self.token.cancel();

        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                error!("Weather refresher task failed: {error}");
                false
            }
            Err(_) => {
                warn!("Weather refresher did not stop within {timeout:?}, aborting it");
                task.abort();
                false
            }
        }
    }
}
