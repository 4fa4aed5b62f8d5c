use std::{ffi::OsStr, path::Path, sync::Arc};

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use include_dir::{include_dir, Dir};
use tracing::*;

use crate::{
    server::{
        error::{Error, Result},
        status::StatusJson,
        template::{Footer, Templates},
    },
    stats::memory,
    weather::WeatherCache,
};

static DIST: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

const INDEX: &str = "index.html";
const ASSET_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const NO_STORE: &str = "no-store";

/// Shared by every worker of the HTTP server.
pub struct AppState {
    pub cache: Arc<WeatherCache>,
    pub templates: Templates,
    pub footer: Footer,
}

impl AppState {
    /// Fails when the embedded dashboard page is missing or is not a valid template.
    pub fn new(cache: Arc<WeatherCache>) -> anyhow::Result<Self> {
        let source = load_file(INDEX)
            .ok_or_else(|| anyhow::anyhow!("Embedded {INDEX} is missing or not UTF-8"))?;

        Ok(Self::with_templates(cache, Templates::new(source)?))
    }

    pub fn with_templates(cache: Arc<WeatherCache>, templates: Templates) -> Self {
        Self {
            cache,
            templates,
            footer: Footer::from_build(),
        }
    }
}

fn load_file(file_name: &str) -> Option<&'static str> {
    DIST.get_file(file_name)
        .and_then(|file| file.contents_utf8())
}

async fn status_json(state: &AppState) -> Result<String> {
    StatusJson::collect(&state.cache)
        .await
        .to_pretty_json()
        .map_err(|error| Error::Internal(format!("{error:?}")))
}

/// Dashboard page with the current status embedded
#[instrument(level = "debug", skip(state))]
pub async fn root(state: web::Data<AppState>) -> Result<HttpResponse> {
    let status_json = status_json(&state).await?;

    let page = state
        .templates
        .render_page(&status_json, &state.footer)
        .map_err(|error| Error::Internal(format!("{error:?}")))?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, NO_STORE))
        .content_type("text/html; charset=utf-8")
        .body(page))
}

/// Live status block polled by the dashboard
#[instrument(level = "debug", skip(state))]
pub async fn status_fragment(state: web::Data<AppState>) -> Result<HttpResponse> {
    let status_json = status_json(&state).await?;
    let fragment = state
        .templates
        .render_fragment(&status_json)
        .map_err(|error| Error::Internal(format!("{error:?}")))?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, NO_STORE))
        .content_type("text/html; charset=utf-8")
        .body(fragment))
}

/// Memory profile of the running process
#[instrument(level = "debug")]
pub async fn pprof() -> Result<HttpResponse> {
    let profile = web::block(memory::snapshot)
        .await?
        .map_err(|error| {
            error!("Failed to take memory profile: {error:?}");
            Error::Internal(format!("{error:?}"))
        })?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, NO_STORE))
        .content_type("text/plain; charset=utf-8")
        .body(profile.to_string()))
}

/// Embedded static assets, the page template itself is never served raw
pub async fn asset(req: HttpRequest) -> Result<HttpResponse> {
    let filename = req.match_info().get("filename").unwrap_or("");

    if filename.is_empty() || filename == INDEX || filename.ends_with(".tmpl") {
        return Err(Error::NotFound(format!(
            "Page does not exist: {filename:?}"
        )));
    }

    let Some(file) = DIST.get_file(filename) else {
        return Err(Error::NotFound(format!(
            "Page does not exist: {filename:?}"
        )));
    };

    let extension = Path::new(filename)
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("");
    let mime = actix_files::file_extension_to_mime(extension).to_string();

    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, ASSET_CACHE_CONTROL))
        .content_type(mime)
        .body(file.contents()))
}
