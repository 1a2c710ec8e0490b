//! Error types for relation loading with actionable messages.
//!
//! Every failure surfaced by the loader carries:
//! - An error code for programmatic handling
//! - The relation key and model type involved
//! - Suggestions for fixing the issue
//!
//! # Error Codes
//!
//! Error codes follow a pattern: T{category}{number}
//! - 1xxx: Fetch errors (backing store failure, cancellation, timeout)
//! - 2xxx: Shape errors (cached lookup requested with the wrong type)
//! - 3xxx: Wiring errors (model never initialized, foreign model, dropped batch)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use turbo_loader::{ErrorCode, LoadError};
//!
//! let err = LoadError::fetch_message("connection reset");
//! assert_eq!(err.code, ErrorCode::FetchFailed);
//! assert!(err.is_fetch_error());
//! assert_eq!(ErrorCode::TypeMismatch.code(), "T2001");
//! ```
//!
//! # Replay
//!
//! `LoadError` is `Clone`: the loader caches the first failure of a relation and
//! hands the same error to every later caller. The source error is shared, not copied.
//!
//! ```rust
//! use turbo_loader::LoadError;
//!
//! let err = LoadError::fetch_message("boom").with_relation("books");
//! let replayed = err.clone();
//! assert_eq!(err, replayed);
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use owo_colors::OwoColorize;
use thiserror::Error;

/// Result type for relation loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Fetch errors (1xxx)
    /// The backing-store fetch failed (T1001).
    FetchFailed = 1001,
    /// The fetch was cancelled through its context (T1002).
    FetchCancelled = 1002,
    /// The fetch exceeded its timeout (T1003).
    FetchTimeout = 1003,

    // Shape errors (2xxx)
    /// Cached lookup requested with an incompatible result type (T2001).
    TypeMismatch = 2001,

    // Wiring errors (3xxx)
    /// Relation accessed on a model that never received a loader (T3001).
    LoaderUninitialized = 3001,
    /// Model is bound to a different loader than the one asked to load it (T3002).
    ForeignModel = 3002,
    /// The batch owning the loader has been dropped (T3003).
    BatchDropped = 3003,

    // Configuration errors (7xxx)
    /// Invalid configuration (T7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (T9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "T1001").
    pub fn code(&self) -> String {
        format!("T{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::FetchFailed => "Relation fetch failed",
            Self::FetchCancelled => "Relation fetch cancelled",
            Self::FetchTimeout => "Relation fetch timed out",
            Self::TypeMismatch => "Relation result type mismatch",
            Self::LoaderUninitialized => "Model has no loader",
            Self::ForeignModel => "Model belongs to another loader",
            Self::BatchDropped => "Batch no longer alive",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model type involved.
    pub model: Option<String>,
    /// The relation key involved.
    pub relation: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

impl ErrorContext {
    /// Create new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the operation.
    pub fn operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    /// Set the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the relation.
    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Add a text suggestion.
    pub fn suggest(mut self, text: impl Into<String>) -> Self {
        self.suggestions.push(Suggestion::new(text));
        self
    }

    /// Set help text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Errors that can occur while loading a relation.
#[derive(Error, Debug, Clone)]
pub struct LoadError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any), shared between replayed copies.
    #[source]
    pub source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl PartialEq for LoadError {
    fn eq(&self, other: &Self) -> bool {
        let same_source = match (&self.source, &other.source) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.code == other.code
            && self.message == other.message
            && self.context == other.context
            && same_source
    }
}

impl LoadError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model type.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the relation key.
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.context.relation = Some(relation.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: StdError + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Wrap a backing-store failure.
    pub fn fetch<E: StdError + Send + Sync + 'static>(source: E) -> Self {
        Self::new(ErrorCode::FetchFailed, format!("Relation fetch failed: {}", source))
            .with_source(source)
            .with_help("Fetch errors are cached for the lifetime of the batch; load a new batch to retry")
    }

    /// Create a fetch failure from a plain message.
    pub fn fetch_message(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::FetchFailed,
            format!("Relation fetch failed: {}", message.into()),
        )
        .with_help("Fetch errors are cached for the lifetime of the batch; load a new batch to retry")
    }

    /// Create a cancellation error.
    pub fn cancelled(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::FetchCancelled,
            format!("Fetch for relation '{}' was cancelled", relation),
        )
        .with_relation(&relation)
    }

    /// Create a timeout error.
    pub fn timeout(relation: impl Into<String>, duration_ms: u64) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::FetchTimeout,
            format!("Fetch for relation '{}' timed out after {}ms", relation, duration_ms),
        )
        .with_relation(&relation)
        .with_suggestion("Increase the fetch timeout on the LoadContext or LoaderConfig")
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(relation: impl Into<String>, expected: &str, found: &str) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::TypeMismatch,
            format!(
                "Relation '{}' was requested as {} but is cached as {}",
                relation, expected, found
            ),
        )
        .with_relation(&relation)
        .with_suggestion("Use a distinct relation key for each result type")
    }

    /// Create an uninitialized-loader error.
    pub fn uninitialized(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::LoaderUninitialized,
            format!(
                "Cannot load relation '{}': {} was never bound to a loader",
                relation, model
            ),
        )
        .with_model(&model)
        .with_relation(&relation)
        .with_code_suggestion(
            "Initialize the batch right after it is fetched",
            "let batch = turbo_loader::initialize(rows);",
        )
    }

    /// Create a foreign-model error.
    pub fn foreign_model(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::ForeignModel,
            format!(
                "Cannot load relation '{}': {} belongs to a different loader",
                relation, model
            ),
        )
        .with_model(&model)
        .with_relation(&relation)
        .with_suggestion("Load the relation through the model's own loader")
    }

    /// Create a batch-dropped error.
    pub fn batch_dropped(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::BatchDropped,
            format!(
                "Cannot load relation '{}': the {} batch has been dropped",
                relation, model
            ),
        )
        .with_model(&model)
        .with_relation(&relation)
        .with_suggestion("Bind models with initialize() so their loader handles keep the batch alive")
    }

    /// Create a configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid loader configuration: {}", message.into()),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    // ============== Error Checks ==============

    /// Check if this error came from the backing-store fetch.
    pub fn is_fetch_error(&self) -> bool {
        self.code == ErrorCode::FetchFailed
    }

    /// Check if this is a type mismatch.
    pub fn is_type_mismatch(&self) -> bool {
        self.code == ErrorCode::TypeMismatch
    }

    /// Check if the model was never bound to a loader.
    pub fn is_uninitialized(&self) -> bool {
        self.code == ErrorCode::LoaderUninitialized
    }

    /// Check if the fetch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::FetchCancelled
    }

    /// Check if the fetch timed out.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::FetchTimeout
    }

    /// Check if this error was raised by the context rather than the store.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.code, ErrorCode::FetchCancelled | ErrorCode::FetchTimeout)
    }

    // ============== Display Functions ==============

    /// Get the error code.
    pub fn error_code(&self) -> &ErrorCode {
        &self.code
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref relation) = self.context.relation {
            output.push_str(&format!("  → Relation: {}\n", relation));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!("     ```\n     {}\n     ```\n", code.replace('\n', "\n     ")));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }

    /// Display error with ANSI colors for terminal output.
    pub fn display_colored(&self) -> String {
        let mut output = String::new();

        let header = format!("Error [{}]", self.code.code());
        output.push_str(&format!("{}: {}\n", header.red().bold(), self.message.bold()));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  {} {}\n", "→ While:".dimmed(), op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  {} {}\n", "→ Model:".dimmed(), model));
        }
        if let Some(ref relation) = self.context.relation {
            output.push_str(&format!("  {} {}\n", "→ Relation:".dimmed(), relation));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str(&format!("\n{}\n", "Suggestions:".yellow().bold()));
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                let index = format!("{}.", i + 1);
                output.push_str(&format!("  {} {}\n", index.yellow(), suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!("     {}\n", code.replace('\n', "\n     ").cyan()));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\n{} {}\n", "Help:".cyan().bold(), help));
        }

        output
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! load_error {
    ($code:expr, $msg:expr) => {
        $crate::error::LoadError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::LoadError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}
