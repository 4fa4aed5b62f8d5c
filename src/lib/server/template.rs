use chrono::{Datelike, Utc};
use handlebars::Handlebars;
use serde::Serialize;

const PAGE: &str = "page";
const FRAGMENT: &str = "status_fragment";

/// Partial page swapped in by the dashboard when it polls for fresh status.
const FRAGMENT_SOURCE: &str =
    r#"<pre id="uptime-status" tabindex="1" class="uptime">{{ status_json }}</pre>"#;

// Rendered in place of the status while checking the page at startup
const STATUS_MARKER: &str = "status-json-placeholder-check";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid template: {0}")]
    Parse(#[from] handlebars::TemplateError),

    #[error("failed to render template: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("template has no {0:?} placeholder")]
    MissingPlaceholder(&'static str),
}

/// Build details rendered in the page footer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Footer {
    pub build_timestamp: String,
    pub commit_hash: String,
    pub year: String,
}

impl Footer {
    pub fn from_build() -> Self {
        let build_timestamp = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("?");

        // The timestamp is RFC 3339, so it starts with the year
        let year = build_timestamp
            .get(..4)
            .filter(|year| year.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().year().to_string());

        Self {
            build_timestamp: build_timestamp.to_string(),
            commit_hash: option_env!("VERGEN_GIT_SHA").unwrap_or("?").to_string(),
            year,
        }
    }
}

#[derive(Serialize)]
struct PageContext<'a> {
    status_json: &'a str,
    build_timestamp: &'a str,
    commit_hash: &'a str,
    year: &'a str,
}

#[derive(Serialize)]
struct FragmentContext<'a> {
    status_json: &'a str,
}

/// Dashboard page and status fragment, registered once at startup.
///
/// Strict mode turns any placeholder without a value into a render error,
/// so [`Templates::new`] renders the page once to reject unknown names.
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new(page_source: &str) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template_string(PAGE, page_source)?;
        registry.register_template_string(FRAGMENT, FRAGMENT_SOURCE)?;

        let templates = Self { registry };

        let page = templates.render_page(STATUS_MARKER, &Footer::from_build())?;
        if !page.contains(STATUS_MARKER) {
            return Err(TemplateError::MissingPlaceholder("status_json"));
        }

        Ok(templates)
    }

    /// Values are HTML-escaped by handlebars.
    pub fn render_page(&self, status_json: &str, footer: &Footer) -> Result<String, TemplateError> {
        let context = PageContext {
            status_json,
            build_timestamp: &footer.build_timestamp,
            commit_hash: &footer.commit_hash,
            year: &footer.year,
        };

        Ok(self.registry.render(PAGE, &context)?)
    }

    pub fn render_fragment(&self, status_json: &str) -> Result<String, TemplateError> {
        Ok(self
            .registry
            .render(FRAGMENT, &FragmentContext { status_json })?)
    }
}
