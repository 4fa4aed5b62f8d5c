use std::{sync::Arc, time::Duration};

use actix_web::web;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::*;

use uptime_dashboard::{
    cli, logger,
    server::{self, pages::AppState},
    weather::{Fetcher, Refresher, WeatherCache},
};

const REFRESHER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> Result<()> {
    // CLI should be started before logger to allow control over verbosity
    cli::manager::init();
    // Logger should start before everything else to register any log information
    logger::manager::init()?;

    let location = cli::manager::location();
    let cache = Arc::new(WeatherCache::new(&location, cli::manager::cache_file()));

    // A broken dashboard page is the only thing worth refusing to start over
    let state = web::Data::new(
        AppState::new(cache.clone()).context("Error parsing the dashboard template")?,
    );

    let fetcher = Arc::new(
        Fetcher::new(&cli::manager::weather_url(), &location)
            .context("Failed to build the weather client")?,
    );
    let refresher = Refresher::new(fetcher, cache);
    refresher.bootstrap().await;

    let token = CancellationToken::new();
    let refresher = refresher.spawn(token.clone());

    let http_server = server::manager::run(&cli::manager::server_address(), state)
        .context("Failed starting the HTTP server")?;
    let server_handle = http_server.handle();

    actix_web::rt::spawn(async move {
        server::manager::shutdown_signal().await;
        info!("Server is shutting down...");

        token.cancel();
        server_handle.stop(true).await;
    });

    if let Err(error) = http_server.await {
        error!("HTTP server error: {error}");
    }

    if !refresher.stop(REFRESHER_STOP_TIMEOUT).await {
        warn!("Weather refresher was not stopped cleanly");
    }

    info!("Byeee");
    Ok(())
}
