//! Property contract consumed by the runner.
//!
//! A property is a named, checkable claim. Its generator lives outside this
//! crate; the runner only needs [`Property::check`], which reports either
//! success or a [`PropertyFailure`] carrying an optional serialized
//! counterexample.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;

use crate::config::TestExecutionConfig;

/// Structured failure reported by a property whose claim was violated.
///
/// # Examples
/// ```
/// use paraprop_core::PropertyFailure;
///
/// let failure = PropertyFailure::new("round trip lost an entity")
///     .with_counterexample("[Line { x: 0.0 }]");
/// assert_eq!(failure.message(), "round trip lost an entity");
/// assert_eq!(failure.counterexample(), Some("[Line { x: 0.0 }]"));
/// ```
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{message}")]
pub struct PropertyFailure {
    message: String,
    counterexample: Option<String>,
}

impl PropertyFailure {
    /// Creates a failure without a counterexample.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            counterexample: None,
        }
    }

    /// Attaches a serialized counterexample to the failure.
    #[must_use]
    pub fn with_counterexample(mut self, counterexample: impl Into<String>) -> Self {
        self.counterexample = Some(counterexample.into());
        self
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the serialized counterexample, when one was captured.
    #[must_use]
    pub fn counterexample(&self) -> Option<&str> {
        self.counterexample.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>) {
        (self.message, self.counterexample)
    }
}

/// Cooperative cancellation flag shared between the runner and a check body.
///
/// The runner cancels the token when a check exceeds its timeout. Bodies that
/// poll [`CancellationToken::is_cancelled`] can return early; opaque bodies
/// keep running on their detached thread until they finish on their own.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Reports whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Per-check context handed to [`Property::check`].
#[derive(Clone, Debug)]
pub struct CheckContext {
    config: TestExecutionConfig,
    cancellation: CancellationToken,
}

impl CheckContext {
    /// Creates a context with a fresh cancellation token.
    #[must_use]
    pub fn new(config: TestExecutionConfig) -> Self {
        Self::with_token(config, CancellationToken::new())
    }

    /// Creates a context observing an existing cancellation token.
    #[must_use]
    pub fn with_token(config: TestExecutionConfig, cancellation: CancellationToken) -> Self {
        Self {
            config,
            cancellation,
        }
    }

    /// Returns the execution settings for this check.
    #[must_use]
    pub fn config(&self) -> &TestExecutionConfig {
        &self.config
    }

    /// Returns the cancellation token for this check.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Shorthand for `self.cancellation().is_cancelled()`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A checkable claim executed by [`crate::ParallelTestRunner`].
///
/// # Examples
/// ```
/// use paraprop_core::{CheckContext, Property, PropertyFailure, TestExecutionConfig};
///
/// struct NonNegative(i64);
///
/// impl Property for NonNegative {
///     fn name(&self) -> &str { "non_negative" }
///     fn check(&self, _ctx: &CheckContext) -> Result<(), PropertyFailure> {
///         if self.0 >= 0 {
///             Ok(())
///         } else {
///             Err(PropertyFailure::new("negative").with_counterexample(self.0.to_string()))
///         }
///     }
/// }
///
/// let ctx = CheckContext::new(TestExecutionConfig::default());
/// assert!(NonNegative(3).check(&ctx).is_ok());
/// assert!(NonNegative(-3).check(&ctx).is_err());
/// ```
pub trait Property: Send + Sync {
    /// Returns the property's name.
    fn name(&self) -> &str;

    /// Runs the property against generated inputs.
    ///
    /// # Errors
    /// Returns [`PropertyFailure`] when the claim is violated.
    fn check(&self, ctx: &CheckContext) -> Result<(), PropertyFailure>;
}

impl<P: Property + ?Sized> Property for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn check(&self, ctx: &CheckContext) -> Result<(), PropertyFailure> {
        (**self).check(ctx)
    }
}

/// Adapts a closure into a [`Property`].
///
/// # Examples
/// ```
/// use paraprop_core::{CheckContext, FnProperty, Property, TestExecutionConfig};
///
/// let property = FnProperty::new("always", |_ctx: &CheckContext| Ok(()));
/// assert_eq!(property.name(), "always");
/// assert!(property.check(&CheckContext::new(TestExecutionConfig::default())).is_ok());
/// ```
pub struct FnProperty<F> {
    name: String,
    body: F,
}

impl<F> FnProperty<F>
where
    F: Fn(&CheckContext) -> Result<(), PropertyFailure> + Send + Sync,
{
    /// Wraps `body` under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<F> Property for FnProperty<F>
where
    F: Fn(&CheckContext) -> Result<(), PropertyFailure> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, ctx: &CheckContext) -> Result<(), PropertyFailure> {
        (self.body)(ctx)
    }
}

impl<F> fmt::Debug for FnProperty<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProperty")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
