use std::{path::PathBuf, sync::Arc};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    version,
    author,
    about,
    long_about = "Serves a status dashboard with host uptime and the current weather, which is fetched in the background and cached on disk."
)]
struct Args {
    /// Sets the address for the HTTP server
    #[arg(long, value_name = "IP>:<PORT", default_value = "0.0.0.0:8080", env = "DASHBOARD_SERVER_ADDRESS")]
    server_address: String,

    /// The location reported on the dashboard
    #[arg(long, default_value = "Sleman", env = "DASHBOARD_LOCATION")]
    location: String,

    /// Base URL of the wttr.in compatible weather service
    #[arg(long, value_name = "URL", default_value = "https://wttr.in", env = "DASHBOARD_WEATHER_URL")]
    weather_url: String,

    /// File where the last weather reading is kept between runs
    #[arg(long, value_name = "PATH", default_value = "data/weather_cache.json", env = "DASHBOARD_CACHE_FILE")]
    cache_file: PathBuf,

    /// Directory for the rolling log files
    #[arg(long, value_name = "PATH", default_value = "./logs", env = "DASHBOARD_LOG_PATH")]
    log_path: PathBuf,

    /// Turn all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

// Return the desired address for the HTTP server
pub fn server_address() -> String {
    MANAGER.clap_matches.server_address.clone()
}

pub fn location() -> String {
    MANAGER.clap_matches.location.clone()
}

pub fn weather_url() -> String {
    MANAGER.clap_matches.weather_url.clone()
}

pub fn cache_file() -> PathBuf {
    MANAGER.clap_matches.cache_file.clone()
}

pub fn log_path() -> PathBuf {
    MANAGER.clap_matches.log_path.clone()
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return the parsed command line struct
pub fn command_line() -> String {
    format!("{:#?}", MANAGER.clap_matches)
}
