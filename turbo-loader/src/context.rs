//! Cancellable execution context handed to relation fetches.
//!
//! ```rust
//! use std::time::Duration;
//! use turbo_loader::LoadContext;
//!
//! let ctx = LoadContext::new().with_timeout(Duration::from_secs(2));
//! let request = ctx.child();
//!
//! ctx.cancel();
//! assert!(request.is_cancelled());
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Execution context for a relation load.
///
/// Cloning is cheap; clones share the same cancellation token.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl LoadContext {
    /// Create a fresh, uncancelled context without a timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            timeout: None,
        }
    }

    /// Bound every fetch run under this context.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Derive a context that is cancelled with this one but can be cancelled alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            timeout: self.timeout,
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check whether the context has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The timeout carried by this context.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The underlying cancellation token.
    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolve once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
