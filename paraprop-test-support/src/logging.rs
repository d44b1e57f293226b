//! Global structured logging for test harnesses.
//!
//! Installs a `tracing` subscriber that writes to `stderr` and bridges the
//! `log` facade. `RUST_LOG` selects the filter and `PARAPROP_LOG_FORMAT`
//! selects `human` (default) or `json` output.

use std::{env, sync::OnceLock};

use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "PARAPROP_LOG_FORMAT";

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Output format of the installed subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Human,
    /// One JSON object per event, with span context.
    Json,
}

impl LogFormat {
    /// Parses `human` or `json`, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    /// Returns [`LoggingError::UnsupportedFormat`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, LoggingError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnsupportedFormat {
                provided: other.to_owned(),
            }),
        }
    }

    fn from_env() -> Result<Self, LoggingError> {
        match env::var(LOG_FORMAT_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(env::VarError::NotPresent) => Ok(Self::Human),
            Err(source @ env::VarError::NotUnicode(_)) => Err(LoggingError::InvalidUnicode {
                name: LOG_FORMAT_ENV,
                source,
            }),
        }
    }
}

/// Errors raised while installing logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The format variable was not valid UTF-8.
    #[error("environment variable `{name}` contained invalid UTF-8: {source}")]
    InvalidUnicode {
        /// Offending variable.
        name: &'static str,
        /// Underlying failure.
        #[source]
        source: env::VarError,
    },
    /// The format variable named an unknown format.
    #[error("unsupported log format `{provided}`; expected `human` or `json`")]
    UnsupportedFormat {
        /// Value supplied.
        provided: String,
    },
}

/// Installs the global subscriber once; later calls are no-ops.
///
/// A subscriber installed elsewhere (for example by another test binary
/// helper) is left in place.
///
/// # Errors
/// Returns [`LoggingError`] when `PARAPROP_LOG_FORMAT` is invalid.
pub fn init_logging() -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let format = LogFormat::from_env()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let output = tracing_subscriber::fmt::layer()
        .with_test_writer()
        .with_thread_names(true);
    let output = match format {
        LogFormat::Human => output.boxed(),
        LogFormat::Json => output.json().with_current_span(true).boxed(),
    };

    // Both installs fail only when another logger already owns the slot.
    if LogTracer::init().is_err() {
        tracing::debug!("log bridge already installed");
    }
    if let Err(error) = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
    {
        tracing::debug!(%error, "keeping existing tracing subscriber");
    }
    INSTALLED.get_or_init(|| ());
    Ok(())
}
