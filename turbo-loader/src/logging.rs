//! Tracing setup for the loader.
//!
//! Every relation load runs inside a `relation` span carrying the relation
//! key, the model type and the batch size. Events emitted while resolving
//! (memo hits, fetches, replays, cancellations) inherit those fields:
//!
//! | Target                    | Events                                  |
//! |---------------------------|-----------------------------------------|
//! | `turbo_loader::model`     | batch initialized (trace)               |
//! | `turbo_loader::loader`    | memo cell created (trace)               |
//! | `turbo_loader::memo`      | fetch start/finish (debug), failure (warn), type mismatch (error) |
//! | `turbo_loader::relations` | children fetched and grouped (debug)    |
//!
//! # Environment Variables
//!
//! - `TURBO_LOG_LEVEL=trace|debug|info|warn|error` - Enable logging at this level
//! - `TURBO_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//! - `TURBO_LOG_RELATIONS=books,chapters` - Only log loads of these relations
//! - `TURBO_LOG_SPANS=1` - Also log each relation span when it closes, with its duration
//!
//! Installing a subscriber needs the `tracing-subscriber` feature; without it
//! the events go to whatever subscriber the application sets up.
//!
//! ```rust,no_run
//! // Honour TURBO_LOG_* (no-op when TURBO_LOG_LEVEL is unset)
//! turbo_loader::logging::init().unwrap();
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing::{Level, Span, debug_span};

use crate::error::LoadResult;
use crate::key::RelationKey;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to JSON.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }
}

/// What to log and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Most verbose level logged.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Relations to log; empty means all.
    pub relations: Vec<RelationKey>,
    /// Log relation spans when they close.
    pub span_events: bool,
}

impl LogSettings {
    /// Log every relation at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::default(),
            relations: Vec::new(),
            span_events: false,
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Restrict logging to loads of `relation`. May be called repeatedly.
    pub fn with_relation(mut self, relation: impl Into<RelationKey>) -> Self {
        self.relations.push(relation.into());
        self
    }

    /// Log relation spans when they close.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Read the settings from `TURBO_LOG_*`. `None` if `TURBO_LOG_LEVEL` is unset.
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Read the settings through `var`. An unknown level reads as `warn`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let level = var("TURBO_LOG_LEVEL")?;
        let mut settings = Self::new(Level::from_str(level.trim()).unwrap_or(Level::WARN));

        if let Some(format) = var("TURBO_LOG_FORMAT") {
            settings.format = LogFormat::parse(&format);
        }
        if let Some(relations) = var("TURBO_LOG_RELATIONS") {
            settings.relations = relations
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(RelationKey::from)
                .collect();
        }
        settings.span_events = var("TURBO_LOG_SPANS")
            .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"));

        Some(settings)
    }

    /// `EnvFilter` directives for these settings.
    ///
    /// With a relation list, the loader logs warnings everywhere and `level`
    /// only inside the spans of the listed relations.
    pub fn directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        if self.relations.is_empty() {
            return format!("turbo={level},turbo_loader={level}");
        }

        let mut directives = String::from("turbo=warn,turbo_loader=warn");
        for relation in &self.relations {
            directives.push_str(&format!(",turbo_loader[relation{{relation={relation}}}]={level}"));
        }
        directives
    }
}

impl fmt::Display for LogSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.directives(), self.format)
    }
}

/// Span wrapping one relation load.
pub(crate) fn relation_span(relation: &RelationKey, model: &'static str, batch: usize) -> Span {
    debug_span!("relation", relation = %relation, model = model, batch = batch)
}

/// Install the subscriber described by `TURBO_LOG_*`, if `TURBO_LOG_LEVEL` is set.
pub fn init() -> LoadResult<()> {
    match LogSettings::from_env() {
        Some(settings) => try_init(&settings),
        None => Ok(()),
    }
}

/// Install a global subscriber for `settings`.
///
/// Fails if the filter is invalid or a global subscriber is already set.
#[cfg(feature = "tracing-subscriber")]
pub fn try_init(settings: &LogSettings) -> LoadResult<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    use crate::error::LoadError;

    let filter = EnvFilter::try_new(settings.directives())
        .map_err(|e| LoadError::invalid_configuration(format!("invalid log filter: {}", e)))?;
    let spans = if settings.span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = match settings.format {
        LogFormat::Json => fmt::layer().json().with_span_events(spans).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_span_events(spans).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_span_events(spans).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoadError::internal(format!("could not install log subscriber: {}", e)))?;

    tracing::info!(settings = %settings, "Turbo logging initialized");
    Ok(())
}

/// Without the `tracing-subscriber` feature there is nothing to install.
#[cfg(not(feature = "tracing-subscriber"))]
pub fn try_init(settings: &LogSettings) -> LoadResult<()> {
    let _ = settings;
    Ok(())
}
