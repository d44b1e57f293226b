//! Runner and per-property execution settings.
//!
//! Usage thresholds are fractions of capacity in `[0, 1]`, matching the units
//! reported by [`crate::ResourceMetrics`].

use std::{num::NonZeroUsize, thread, time::Duration};

use crate::error::{ParapropError, Result};

/// Worker count used when hardware concurrency cannot be detected.
const FALLBACK_THREADS: usize = 4;

/// Settings for a single property registration.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use paraprop_core::TestExecutionConfig;
///
/// let config = TestExecutionConfig::default()
///     .with_max_test_count(10)
///     .with_timeout_ms(250);
/// assert_eq!(config.max_test_count(), 10);
/// assert_eq!(config.timeout_or(Duration::from_secs(60)), Duration::from_millis(250));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestExecutionConfig {
    max_test_count: u32,
    timeout_ms: u64,
    max_shrink_iters: u32,
    seed: Option<u64>,
}

impl Default for TestExecutionConfig {
    fn default() -> Self {
        Self {
            max_test_count: 100,
            timeout_ms: 0,
            max_shrink_iters: 1024,
            seed: None,
        }
    }
}

impl TestExecutionConfig {
    /// Overrides the number of generated cases per check.
    #[must_use]
    pub fn with_max_test_count(mut self, count: u32) -> Self {
        self.max_test_count = count;
        self
    }

    /// Overrides the per-check timeout. Zero defers to the runner default.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Caps shrink iterations performed by generator-backed properties.
    #[must_use]
    pub fn with_max_shrink_iters(mut self, iters: u32) -> Self {
        self.max_shrink_iters = iters;
        self
    }

    /// Pins the generator seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns the number of generated cases per check.
    #[must_use]
    pub fn max_test_count(&self) -> u32 {
        self.max_test_count
    }

    /// Returns the raw timeout in milliseconds; zero means "runner default".
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Returns the shrink iteration cap.
    #[must_use]
    pub fn max_shrink_iters(&self) -> u32 {
        self.max_shrink_iters
    }

    /// Returns the pinned seed, if any.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Resolves the effective timeout, using `fallback` when unset.
    #[must_use]
    pub fn timeout_or(&self, fallback: Duration) -> Duration {
        if self.timeout_ms == 0 {
            fallback
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }
}

/// Configuration for [`crate::ParallelTestRunner`].
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use paraprop_core::RunnerConfig;
///
/// let config = RunnerConfig::default()
///     .with_num_threads(2)
///     .with_adaptive_scheduling(false)
///     .with_default_timeout(Duration::from_secs(5));
/// assert_eq!(config.effective_threads(), 2);
/// assert!(!config.adaptive_scheduling());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    num_threads: usize,
    max_concurrent_tests: usize,
    default_timeout: Duration,
    adaptive_scheduling: bool,
    cpu_threshold: f64,
    memory_threshold: f64,
    sampling_interval: Duration,
    admission_poll: Duration,
    max_admission_wait: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            max_concurrent_tests: 0,
            default_timeout: Duration::from_secs(60),
            adaptive_scheduling: true,
            cpu_threshold: 0.8,
            memory_threshold: 0.8,
            sampling_interval: Duration::from_millis(500),
            admission_poll: Duration::from_millis(10),
            max_admission_wait: Duration::from_secs(30),
        }
    }
}

impl RunnerConfig {
    /// Sets the worker count; zero selects hardware concurrency.
    #[must_use]
    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Caps concurrently executing checks; zero means unlimited.
    #[must_use]
    pub fn with_max_concurrent_tests(mut self, limit: usize) -> Self {
        self.max_concurrent_tests = limit;
        self
    }

    /// Sets the timeout applied when a registration leaves `timeout_ms` at zero.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Enables or disables resource-aware admission control.
    #[must_use]
    pub fn with_adaptive_scheduling(mut self, enabled: bool) -> Self {
        self.adaptive_scheduling = enabled;
        self
    }

    /// Sets the CPU usage fraction above which submission pauses.
    #[must_use]
    pub fn with_cpu_threshold(mut self, threshold: f64) -> Self {
        self.cpu_threshold = threshold;
        self
    }

    /// Sets the memory usage fraction above which submission pauses.
    #[must_use]
    pub fn with_memory_threshold(mut self, threshold: f64) -> Self {
        self.memory_threshold = threshold;
        self
    }

    /// Sets how often the runner's own sampler refreshes telemetry.
    #[must_use]
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Sets the sleep between admission-control polls.
    #[must_use]
    pub fn with_admission_poll(mut self, poll: Duration) -> Self {
        self.admission_poll = poll;
        self
    }

    /// Bounds how long a single task may wait for admission.
    #[must_use]
    pub fn with_max_admission_wait(mut self, wait: Duration) -> Self {
        self.max_admission_wait = wait;
        self
    }

    /// Returns the configured worker count (zero means auto-detect).
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Returns the concurrent check cap (zero means unlimited).
    #[must_use]
    pub fn max_concurrent_tests(&self) -> usize {
        self.max_concurrent_tests
    }

    /// Returns the fallback per-check timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Returns whether admission control is enabled.
    #[must_use]
    pub fn adaptive_scheduling(&self) -> bool {
        self.adaptive_scheduling
    }

    /// Returns the CPU admission threshold.
    #[must_use]
    pub fn cpu_threshold(&self) -> f64 {
        self.cpu_threshold
    }

    /// Returns the memory admission threshold.
    #[must_use]
    pub fn memory_threshold(&self) -> f64 {
        self.memory_threshold
    }

    /// Returns the sampler refresh interval.
    #[must_use]
    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    /// Returns the admission poll interval.
    #[must_use]
    pub fn admission_poll(&self) -> Duration {
        self.admission_poll
    }

    /// Returns the admission wait bound.
    #[must_use]
    pub fn max_admission_wait(&self) -> Duration {
        self.max_admission_wait
    }

    /// Resolves the worker count actually used by the pool.
    ///
    /// Zero falls back to detected hardware concurrency, or four when that is
    /// unavailable.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        resolve_thread_count(self.num_threads, thread::available_parallelism().ok())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(ParapropError::invalid_config(
                "default_timeout must be greater than zero",
            ));
        }
        validate_fraction("cpu_threshold", self.cpu_threshold)?;
        validate_fraction("memory_threshold", self.memory_threshold)?;
        if self.adaptive_scheduling {
            if self.sampling_interval.is_zero() {
                return Err(ParapropError::invalid_config(
                    "sampling_interval must be greater than zero when adaptive scheduling is enabled",
                ));
            }
            if self.admission_poll.is_zero() {
                return Err(ParapropError::invalid_config(
                    "admission_poll must be greater than zero when adaptive scheduling is enabled",
                ));
            }
        }
        Ok(())
    }
}

pub(crate) fn resolve_thread_count(requested: usize, detected: Option<NonZeroUsize>) -> usize {
    if requested > 0 {
        return requested;
    }
    detected.map_or(FALLBACK_THREADS, NonZeroUsize::get)
}

pub(crate) fn validate_fraction(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParapropError::invalid_config(format!(
            "{field} must be a positive finite fraction (got {value})"
        )))
    }
}
