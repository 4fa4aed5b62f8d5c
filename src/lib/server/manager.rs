use std::time::Duration;

use actix_web::{dev::Server, web, App, HttpServer};
use tracing::*;
use tracing_actix_web::TracingLogger;

use super::pages::{self, AppState};

/// In-flight requests get this long to finish once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Bind the dashboard server to the desired address.
// Signals are left to the caller, which stops the server through its handle.
pub fn run(server_address: &str, state: web::Data<AppState>) -> Result<Server, std::io::Error> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .keep_alive(KEEP_ALIVE)
    .client_request_timeout(CLIENT_REQUEST_TIMEOUT)
    .shutdown_timeout(SHUTDOWN_TIMEOUT.as_secs())
    .disable_signals()
    .bind(server_address)?
    .run();

    info!("Server running at {server_address}");

    Ok(server)
}

/// Static file serving is the catch-all, so it must be registered last
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::root))
        .route("/status-fragment", web::get().to(pages::status_fragment))
        .route("/pprof", web::get().to(pages::pprof))
        .route(r"/{filename:.+}", web::get().to(pages::asset));
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => Some(terminate),
            Err(error) => {
                warn!("Failed to install SIGTERM handler: {error}. Only Ctrl+C will stop the server");
                None
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match terminate.as_mut() {
                    Some(terminate) => {
                        terminate.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
    }
}
