//! Batch execution of property checks on a worker pool.
//!
//! Every check runs on its own short-lived thread so the pool worker can
//! bound it with a timeout. A check that outlives its timeout has its
//! [`CancellationToken`] cancelled and its thread detached; cooperative bodies
//! return early, opaque ones keep running until they finish on their own.

use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, instrument, warn};

use crate::{
    adaptive::ThreadPoolInfo,
    config::{RunnerConfig, TestExecutionConfig},
    error::{ParapropError, Result, panic_message},
    monitor::{MonitorConfig, ResourceMonitor},
    property::{CancellationToken, CheckContext, Property, PropertyFailure},
    result::{TestResult, TestSuite},
    telemetry::{MetricsCollector, SystemCollector},
    thread_pool::{TaskHandle, ThreadPool},
};

/// One registered check awaiting execution.
#[derive(Clone)]
pub struct TestTask {
    name: String,
    property: Arc<dyn Property>,
    config: TestExecutionConfig,
    timeout: Duration,
}

impl TestTask {
    /// Bundles a property with its execution settings and timeout.
    pub fn new(
        name: impl Into<String>,
        property: Arc<dyn Property>,
        config: TestExecutionConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            property,
            config,
            timeout,
        }
    }

    /// Returns the registration name reported in the result.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the wall-clock limit for the check.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the settings handed to the property.
    #[must_use]
    pub fn config(&self) -> &TestExecutionConfig {
        &self.config
    }
}

impl fmt::Debug for TestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTask")
            .field("name", &self.name)
            .field("property", &self.property.name())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Runs registered properties concurrently with timeouts and admission
/// control.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use paraprop_core::{
///     FnProperty, ParallelTestRunner, PropertyFailure, RunnerConfig, TestExecutionConfig,
/// };
///
/// let runner = ParallelTestRunner::new(
///     RunnerConfig::default()
///         .with_num_threads(2)
///         .with_adaptive_scheduling(false),
/// )
/// .expect("configuration is valid");
/// runner.add_property(
///     "addition commutes",
///     FnProperty::new("commutes", |_| Ok(())),
///     TestExecutionConfig::default(),
/// );
/// runner.add_property(
///     "always fails",
///     FnProperty::new("fails", |_| Err(PropertyFailure::new("nope").with_counterexample("0"))),
///     TestExecutionConfig::default(),
/// );
/// let results = runner.run_all().expect("runner is live");
/// assert!(results[0].success());
/// assert_eq!(results[1].counterexample(), Some("0"));
/// ```
pub struct ParallelTestRunner {
    config: RunnerConfig,
    threads: usize,
    pool: ThreadPool,
    pending: Mutex<VecDeque<TestTask>>,
    monitor: Option<Arc<ResourceMonitor>>,
    owns_monitor: bool,
}

impl ParallelTestRunner {
    /// Creates a runner sampling telemetry through [`SystemCollector`] when
    /// adaptive scheduling is enabled.
    ///
    /// # Errors
    /// Returns [`ParapropError::InvalidConfig`] for rejected settings and
    /// [`ParapropError::WorkerSpawn`] when threads cannot be started.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        Self::with_collector(config, Arc::new(SystemCollector::new()))
    }

    /// Creates a runner that owns a monitor backed by `collector`.
    ///
    /// The collector is ignored when adaptive scheduling is disabled.
    ///
    /// # Errors
    /// See [`ParallelTestRunner::new`].
    pub fn with_collector(
        config: RunnerConfig,
        collector: Arc<dyn MetricsCollector>,
    ) -> Result<Self> {
        config.validate()?;
        let monitor = if config.adaptive_scheduling() {
            let monitor = ResourceMonitor::with_collector(
                MonitorConfig::default()
                    .with_sampling_interval(config.sampling_interval())
                    .with_alerts(false),
                collector,
            )?;
            monitor.start()?;
            Some(Arc::new(monitor))
        } else {
            None
        };
        Self::build(config, monitor, true)
    }

    /// Creates a runner that reads from a shared monitor.
    ///
    /// The runner never starts or stops a shared monitor; its owner does.
    ///
    /// # Errors
    /// See [`ParallelTestRunner::new`].
    pub fn with_monitor(config: RunnerConfig, monitor: Arc<ResourceMonitor>) -> Result<Self> {
        config.validate()?;
        Self::build(config, Some(monitor), false)
    }

    fn build(
        config: RunnerConfig,
        monitor: Option<Arc<ResourceMonitor>>,
        owns_monitor: bool,
    ) -> Result<Self> {
        let threads = config.effective_threads();
        let pool = ThreadPool::with_name("paraprop-runner", threads)?;
        debug!(threads, adaptive = config.adaptive_scheduling(), "runner created");
        Ok(Self {
            config,
            threads,
            pool,
            pending: Mutex::new(VecDeque::new()),
            monitor,
            owns_monitor,
        })
    }

    /// Queues `property` under `name` with the timeout from `exec_config`,
    /// or the runner's default timeout when that is zero.
    pub fn add_property<P>(
        &self,
        name: impl Into<String>,
        property: P,
        exec_config: TestExecutionConfig,
    ) where
        P: Property + 'static,
    {
        let timeout = exec_config.timeout_or(self.config.default_timeout());
        self.add_task(TestTask::new(name, Arc::new(property), exec_config, timeout));
    }

    /// Queues a prepared task.
    pub fn add_task(&self, task: TestTask) {
        self.lock_pending().push_back(task);
    }

    /// Executes every pending task and returns one result per task in
    /// submission order.
    ///
    /// # Errors
    /// Returns [`ParapropError::PoolShutDown`] when called after
    /// [`stop`](Self::stop); pending tasks stay queued.
    #[instrument(name = "runner.run_all", skip(self), fields(pending = self.get_pending_tests()))]
    pub fn run_all(&self) -> Result<Vec<TestResult>> {
        if self.pool.is_shut_down() {
            return Err(ParapropError::PoolShutDown);
        }
        let mut submitted = Vec::new();
        while let Some(task) = self.pop_pending() {
            if self.config.adaptive_scheduling() {
                self.wait_for_admission(&task.name);
            }
            let name = task.name.clone();
            let handle = self.pool.enqueue(move || run_test_with_timeout(task));
            submitted.push((name, handle));
        }
        let results: Vec<TestResult> = submitted
            .into_iter()
            .map(|(name, handle)| resolve(name, handle))
            .collect();
        for result in &results {
            record_outcome(result);
        }
        Ok(results)
    }

    /// Runs every pending task and bundles the results under `name`.
    ///
    /// # Errors
    /// See [`run_all`](Self::run_all).
    pub fn run_suite(&self, name: impl Into<String>) -> Result<TestSuite> {
        let started = Instant::now();
        let results = self.run_all()?;
        Ok(TestSuite::new(name, results, started.elapsed()))
    }

    /// Stops the owned sampling thread and shuts the pool down.
    ///
    /// Detached check threads are not waited for.
    pub fn stop(&self) {
        if self.owns_monitor {
            if let Some(monitor) = &self.monitor {
                monitor.stop();
            }
        }
        self.pool.shutdown();
    }

    /// Latest sampled CPU usage, or zero without a monitor.
    #[must_use]
    pub fn get_cpu_usage(&self) -> f64 {
        self.monitor
            .as_ref()
            .map_or(0.0, |monitor| monitor.get_current_metrics().cpu_usage_percent)
    }

    /// Latest sampled memory usage, or zero without a monitor.
    #[must_use]
    pub fn get_memory_usage(&self) -> f64 {
        self.monitor
            .as_ref()
            .map_or(0.0, |monitor| monitor.get_current_metrics().memory_usage_percent)
    }

    /// Pool workers currently executing a task.
    #[must_use]
    pub fn get_active_threads(&self) -> usize {
        self.pool.active_workers()
    }

    /// Tasks registered but not yet submitted.
    #[must_use]
    pub fn get_pending_tests(&self) -> usize {
        self.lock_pending().len()
    }

    /// Worker count resolved at construction.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        self.threads
    }

    /// Describes the worker pool for [`crate::AdaptiveResourceManager`].
    #[must_use]
    pub fn pool_info(
        &self,
        name: impl Into<String>,
        min_threads: usize,
        max_threads: usize,
    ) -> ThreadPoolInfo {
        self.pool.pool_info(name, min_threads, max_threads)
    }

    /// Returns the monitor consulted for admission control, if any.
    #[must_use]
    pub fn monitor(&self) -> Option<&Arc<ResourceMonitor>> {
        self.monitor.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn pop_pending(&self) -> Option<TestTask> {
        self.lock_pending().pop_front()
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<TestTask>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Polls until the admission gate opens or `max_admission_wait` passes.
    fn wait_for_admission(&self, test_name: &str) {
        let started = Instant::now();
        while let Some(reason) = self.admission_blocker() {
            if started.elapsed() >= self.config.max_admission_wait() {
                warn!(test_name, reason, "admission wait exceeded; submitting anyway");
                return;
            }
            thread::sleep(self.config.admission_poll());
        }
    }

    /// Work already handed to the pool (running or queued) counts toward the
    /// concurrency cap.
    fn admission_blocker(&self) -> Option<&'static str> {
        let cap = self.config.max_concurrent_tests();
        if cap > 0 && self.pool.outstanding_work() >= cap {
            return Some("concurrency cap reached");
        }
        let metrics = self.monitor.as_ref()?.get_current_metrics();
        if metrics.cpu_usage_percent > self.config.cpu_threshold() {
            Some("cpu usage above threshold")
        } else if metrics.memory_usage_percent > self.config.memory_threshold() {
            Some("memory usage above threshold")
        } else {
            None
        }
    }
}

impl fmt::Debug for ParallelTestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelTestRunner")
            .field("config", &self.config)
            .field("threads", &self.threads)
            .field("pending", &self.get_pending_tests())
            .finish_non_exhaustive()
    }
}

impl Drop for ParallelTestRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

type CheckOutcome = core::result::Result<core::result::Result<(), PropertyFailure>, String>;

fn resolve(name: String, handle: Result<TaskHandle<TestResult>>) -> TestResult {
    match handle.and_then(TaskHandle::join) {
        Ok(result) => result,
        Err(error) => TestResult::runtime_error(name, Duration::ZERO, error.to_string()),
    }
}

/// Runs `task` on a dedicated thread, waiting at most `task.timeout`.
fn run_test_with_timeout(task: TestTask) -> TestResult {
    let TestTask {
        name,
        property,
        config,
        timeout,
    } = task;
    let token = CancellationToken::new();
    let context = CheckContext::with_token(config, token.clone());
    let (sender, receiver) = mpsc::sync_channel::<CheckOutcome>(1);
    let started = Instant::now();

    let spawned = thread::Builder::new()
        .name("paraprop-check".to_owned())
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| property.check(&context)))
                .map_err(|payload| panic_message(payload.as_ref()));
            if sender.send(outcome).is_err() {
                debug!(property = property.name(), "discarding outcome of a timed-out check");
            }
        });
    let handle = match spawned {
        Ok(handle) => handle,
        Err(error) => {
            return TestResult::runtime_error(
                name,
                started.elapsed(),
                format!("failed to spawn check thread: {error}"),
            );
        }
    };

    match receiver.recv_timeout(timeout) {
        Ok(outcome) => {
            let duration = started.elapsed();
            if handle.join().is_err() {
                debug!(test_name = %name, "check thread panicked after reporting");
            }
            match outcome {
                Ok(Ok(())) => TestResult::passed(name, duration),
                Ok(Err(failure)) => TestResult::property_failure(name, duration, failure),
                Err(message) => {
                    TestResult::runtime_error(name, duration, format!("check panicked: {message}"))
                }
            }
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            token.cancel();
            warn!(
                test_name = %name,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "check exceeded its timeout; detaching"
            );
            drop(handle);
            TestResult::timed_out(name, timeout)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => TestResult::runtime_error(
            name,
            started.elapsed(),
            "check thread exited without reporting",
        ),
    }
}

#[cfg(feature = "metrics")]
fn record_outcome(result: &TestResult) {
    let outcome = match result.kind() {
        crate::result::FailureKind::Passed => "passed",
        crate::result::FailureKind::PropertyFailure => "property_failure",
        crate::result::FailureKind::Timeout => "timeout",
        crate::result::FailureKind::RuntimeError => "runtime_error",
    };
    metrics::counter!("paraprop_tests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("paraprop_test_duration_seconds").record(result.duration().as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
fn record_outcome(_result: &TestResult) {}
