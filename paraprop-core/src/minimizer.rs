//! Greedy shrinking of failing inputs to a locally minimal counterexample.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, instrument};

pub mod shrinkers;

/// Produces strictly simpler candidates from a value.
pub type ShrinkFunction<T> = Arc<dyn Fn(&T) -> Vec<T> + Send + Sync>;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Limits for one [`CounterexampleMinimizer::minimize`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinimizerConfig {
    max_shrink_attempts: usize,
    timeout: Duration,
    verbose: bool,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_shrink_attempts: 1000,
            timeout: Duration::from_secs(5),
            verbose: false,
        }
    }
}

impl MinimizerConfig {
    /// Caps the number of shrink rounds.
    #[must_use]
    pub fn with_max_shrink_attempts(mut self, attempts: usize) -> Self {
        self.max_shrink_attempts = attempts;
        self
    }

    /// Bounds the wall-clock time spent shrinking.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Logs every accepted step at `info` instead of `debug`.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns the round cap.
    #[must_use]
    pub fn max_shrink_attempts(&self) -> usize {
        self.max_shrink_attempts
    }

    /// Returns the time budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns whether steps are logged at `info`.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// Outcome of a minimization run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinimizationResult<T> {
    /// Smallest failing value found.
    pub minimal_value: T,
    /// Accepted shrink steps.
    pub shrink_steps: usize,
    /// Wall-clock time spent.
    pub duration: Duration,
    /// Whether the time budget ran out before convergence.
    pub timed_out: bool,
}

/// Shrinks a failing value while the property keeps failing.
///
/// The property returns `true` when a value passes. A candidate is accepted
/// when the property returns `false` or panics.
///
/// # Examples
/// ```
/// use paraprop_core::{CounterexampleMinimizer, MinimizerConfig, shrinkers};
///
/// // Fails for every value of at least 10.
/// let minimizer = CounterexampleMinimizer::new(|value: &i64| *value < 10, shrinkers::integral);
/// let result = minimizer.minimize(1_000, &MinimizerConfig::default());
/// assert_eq!(result.minimal_value, 10);
/// assert!(!result.timed_out);
/// ```
pub struct CounterexampleMinimizer<T> {
    property: Predicate<T>,
    shrinkers: Vec<ShrinkFunction<T>>,
}

impl<T> CounterexampleMinimizer<T> {
    /// Creates a minimizer from a passing predicate and a primary shrinker.
    pub fn new<P, S>(property: P, shrink: S) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        S: Fn(&T) -> Vec<T> + Send + Sync + 'static,
    {
        Self {
            property: Arc::new(property),
            shrinkers: vec![Arc::new(shrink)],
        }
    }

    /// Adds a shrinker whose candidates are tried after the existing ones.
    pub fn add_shrink_strategy<S>(&mut self, shrink: S)
    where
        S: Fn(&T) -> Vec<T> + Send + Sync + 'static,
    {
        self.shrinkers.push(Arc::new(shrink));
    }

    /// Greedily replaces `initial` with the first failing candidate until no
    /// candidate fails, the round cap is hit, or the time budget runs out.
    ///
    /// The budget is checked before every candidate evaluation.
    #[instrument(
        name = "minimizer.minimize",
        skip_all,
        fields(max_attempts = config.max_shrink_attempts)
    )]
    pub fn minimize(&self, initial: T, config: &MinimizerConfig) -> MinimizationResult<T> {
        let started = Instant::now();
        let mut current = initial;
        let mut shrink_steps = 0;
        let mut timed_out = false;

        'rounds: for _ in 0..config.max_shrink_attempts {
            let mut accepted = None;
            for candidate in self.candidates(&current) {
                if started.elapsed() >= config.timeout {
                    timed_out = true;
                    break 'rounds;
                }
                if self.fails(&candidate) {
                    accepted = Some(candidate);
                    break;
                }
            }
            let Some(next) = accepted else {
                break;
            };
            current = next;
            shrink_steps += 1;
            if config.verbose {
                info!(step = shrink_steps, "accepted smaller counterexample");
            } else {
                debug!(step = shrink_steps, "accepted smaller counterexample");
            }
        }

        MinimizationResult {
            minimal_value: current,
            shrink_steps,
            duration: started.elapsed(),
            timed_out,
        }
    }

    fn candidates<'a>(&'a self, value: &'a T) -> impl Iterator<Item = T> + 'a {
        self.shrinkers.iter().flat_map(move |shrink| shrink(value))
    }

    fn fails(&self, candidate: &T) -> bool {
        panic::catch_unwind(AssertUnwindSafe(|| (self.property)(candidate)))
            .map_or(true, |passes| !passes)
    }
}

impl<T> fmt::Debug for CounterexampleMinimizer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterexampleMinimizer")
            .field("shrinkers", &self.shrinkers.len())
            .finish_non_exhaustive()
    }
}
