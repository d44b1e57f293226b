//! Spreads registrations across several runners and runs them together.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use tracing::{debug, instrument};

use crate::{
    config::TestExecutionConfig,
    error::{ParapropError, Result, panic_message},
    property::Property,
    result::TestResult,
    runner::ParallelTestRunner,
};

/// Picks a runner index for a task name.
pub type RunnerSelector = Arc<dyn Fn(&str, &[ParallelTestRunner]) -> usize + Send + Sync>;

/// How [`TestDistributor::add_property`] picks a runner.
#[derive(Clone, Default)]
pub enum DistributionStrategy {
    /// Cycle through runners in registration order.
    #[default]
    RoundRobin,
    /// Pick the runner with the fewest pending tasks; ties go to the first.
    LoadBalanced,
    /// Ask a caller-supplied selector; round-robin when absent.
    AffinityBased(Option<RunnerSelector>),
}

impl fmt::Debug for DistributionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => f.write_str("RoundRobin"),
            Self::LoadBalanced => f.write_str("LoadBalanced"),
            Self::AffinityBased(selector) => f
                .debug_tuple("AffinityBased")
                .field(&selector.as_ref().map(|_| "<selector>"))
                .finish(),
        }
    }
}

/// Fans registrations out to several [`ParallelTestRunner`]s.
///
/// # Examples
/// ```
/// use paraprop_core::{
///     DistributionStrategy, FnProperty, ParallelTestRunner, RunnerConfig, TestDistributor,
///     TestExecutionConfig,
/// };
///
/// let config = RunnerConfig::default()
///     .with_num_threads(1)
///     .with_adaptive_scheduling(false);
/// let runners = vec![
///     ParallelTestRunner::new(config.clone()).expect("runner starts"),
///     ParallelTestRunner::new(config).expect("runner starts"),
/// ];
/// let distributor = TestDistributor::new(runners, DistributionStrategy::RoundRobin)
///     .expect("at least one runner");
/// for index in 0..4 {
///     distributor
///         .add_property(
///             format!("task-{index}"),
///             FnProperty::new("ok", |_| Ok(())),
///             TestExecutionConfig::default(),
///         )
///         .expect("selection succeeds");
/// }
/// let results = distributor.run_all().expect("runners are live");
/// assert_eq!(results.len(), 2);
/// assert!(results.iter().all(|batch| batch.len() == 2));
/// ```
pub struct TestDistributor {
    runners: Vec<ParallelTestRunner>,
    strategy: DistributionStrategy,
    next: AtomicUsize,
}

impl TestDistributor {
    /// Takes ownership of `runners`.
    ///
    /// # Errors
    /// Returns [`ParapropError::NoRunners`] when `runners` is empty.
    pub fn new(runners: Vec<ParallelTestRunner>, strategy: DistributionStrategy) -> Result<Self> {
        if runners.is_empty() {
            return Err(ParapropError::NoRunners);
        }
        Ok(Self {
            runners,
            strategy,
            next: AtomicUsize::new(0),
        })
    }

    /// Forwards the registration to the runner chosen by the strategy and
    /// returns that runner's index.
    ///
    /// # Errors
    /// Returns [`ParapropError::RunnerIndexOutOfRange`] when an affinity
    /// selector names a runner that does not exist.
    pub fn add_property<P>(
        &self,
        name: impl Into<String>,
        property: P,
        exec_config: TestExecutionConfig,
    ) -> Result<usize>
    where
        P: Property + 'static,
    {
        let name = name.into();
        let index = self.select(&name)?;
        debug!(test_name = %name, runner = index, "distributing property");
        let runner = self
            .runners
            .get(index)
            .ok_or(ParapropError::RunnerIndexOutOfRange {
                index,
                runners: self.runners.len(),
            })?;
        runner.add_property(name, property, exec_config);
        Ok(index)
    }

    /// Runs every runner concurrently and returns their results in
    /// registration order.
    ///
    /// # Errors
    /// Returns the first runner error, in registration order.
    #[instrument(name = "distributor.run_all", skip(self), fields(runners = self.runners.len()))]
    pub fn run_all(&self) -> Result<Vec<Vec<TestResult>>> {
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .runners
                .iter()
                .map(|runner| scope.spawn(move || runner.run_all()))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        Err(ParapropError::TaskPanicked {
                            message: panic_message(payload.as_ref()),
                        })
                    })
                })
                .collect()
        })
    }

    /// Stops every runner.
    pub fn stop(&self) {
        for runner in &self.runners {
            runner.stop();
        }
    }

    /// Returns the runners in registration order.
    #[must_use]
    pub fn runners(&self) -> &[ParallelTestRunner] {
        &self.runners
    }

    /// Returns how many runners are managed.
    #[must_use]
    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    /// Returns the active strategy.
    #[must_use]
    pub fn strategy(&self) -> &DistributionStrategy {
        &self.strategy
    }

    fn select(&self, name: &str) -> Result<usize> {
        match &self.strategy {
            DistributionStrategy::RoundRobin | DistributionStrategy::AffinityBased(None) => {
                Ok(self.round_robin())
            }
            DistributionStrategy::LoadBalanced => Ok(self.least_loaded()),
            DistributionStrategy::AffinityBased(Some(selector)) => {
                let index = selector(name, &self.runners);
                if index < self.runners.len() {
                    Ok(index)
                } else {
                    Err(ParapropError::RunnerIndexOutOfRange {
                        index,
                        runners: self.runners.len(),
                    })
                }
            }
        }
    }

    fn round_robin(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.runners.len()
    }

    fn least_loaded(&self) -> usize {
        // `min_by_key` returns the first of equal minima.
        self.runners
            .iter()
            .enumerate()
            .min_by_key(|(_, runner)| runner.get_pending_tests())
            .map_or(0, |(index, _)| index)
    }
}

impl fmt::Debug for TestDistributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDistributor")
            .field("runners", &self.runners.len())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
