//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the directive passed in. Set
//! `WARDEN_LOG_FORMAT=json` for one JSON object per event.

use std::sync::OnceLock;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_ENV: &str = "WARDEN_LOG_FORMAT";

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Unknown values fall back to the human-readable format.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

/// Install the global subscriber once. Later calls, or a subscriber installed
/// by someone else, are left alone.
pub fn init_tracing(default_directive: &str) {
    TRACING_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let format = LogFormat::from_env();

        let registry = tracing_subscriber::registry().with(filter);
        let installed = match format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_writer(writer()),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(!cfg!(test))
                        .with_writer(writer()),
                )
                .try_init(),
        };

        if installed.is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
        } else {
            tracing::debug!(format = ?format, "tracing initialized");
        }
    });
}

/// Stdout, or libtest's captured output when running tests.
fn writer() -> BoxMakeWriter {
    if cfg!(test) {
        BoxMakeWriter::new(fmt::TestWriter::new())
    } else {
        BoxMakeWriter::new(std::io::stdout)
    }
}
