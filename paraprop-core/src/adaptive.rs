//! Feedback loop that resizes registered pools toward utilisation targets.
//!
//! Each cycle reads the latest [`ResourceMetrics`], derives a constraint ratio
//! against the configured targets, and proposes a proportional resize for
//! every registered pool. Proposals are clamped to the pool's bounds and
//! dropped when they move fewer than [`HYSTERESIS_THREADS`] threads.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, info, instrument, warn};

use crate::{
    config::validate_fraction,
    error::{ParapropError, Result},
    monitor::ResourceMonitor,
    signal::StopSignal,
    telemetry::ResourceMetrics,
};

/// Ratio above which pools shrink.
const SHRINK_ABOVE: f64 = 1.1;
/// Ratio below which pools grow.
const GROW_BELOW: f64 = 0.9;
/// Smallest resize the control loop will apply.
pub const HYSTERESIS_THREADS: usize = 2;

type SizeGetter = Box<dyn Fn() -> usize + Send + Sync>;
type SizeSetter = Box<dyn Fn(usize) + Send + Sync>;

/// A resizable resource registered with [`AdaptiveResourceManager`].
///
/// The getter and setter run while the manager holds its registry lock, so
/// they must be cheap and must not call back into the manager.
///
/// # Examples
/// ```
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use paraprop_core::ThreadPoolInfo;
///
/// let size = Arc::new(AtomicUsize::new(4));
/// let (read, write) = (Arc::clone(&size), Arc::clone(&size));
/// let info = ThreadPoolInfo::new(
///     "io",
///     move || read.load(Ordering::SeqCst),
///     move |n| write.store(n, Ordering::SeqCst),
///     1,
///     8,
/// );
/// info.apply_size(6);
/// assert_eq!(info.current_size(), 6);
/// ```
pub struct ThreadPoolInfo {
    name: String,
    get_size: SizeGetter,
    set_size: SizeSetter,
    min_threads: usize,
    max_threads: usize,
}

impl ThreadPoolInfo {
    /// Describes a pool through its size accessors and bounds.
    pub fn new<G, S>(
        name: impl Into<String>,
        get_size: G,
        set_size: S,
        min_threads: usize,
        max_threads: usize,
    ) -> Self
    where
        G: Fn() -> usize + Send + Sync + 'static,
        S: Fn(usize) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            get_size: Box::new(get_size),
            set_size: Box::new(set_size),
            min_threads,
            max_threads,
        }
    }

    /// Returns the registration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the pool's current size.
    #[must_use]
    pub fn current_size(&self) -> usize {
        (self.get_size)()
    }

    /// Asks the pool to resize. No clamping happens here.
    pub fn apply_size(&self, size: usize) {
        (self.set_size)(size);
    }

    /// Returns the lower bound.
    #[must_use]
    pub fn min_threads(&self) -> usize {
        self.min_threads
    }

    /// Returns the upper bound.
    #[must_use]
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    fn clamp(&self, size: usize) -> usize {
        size.clamp(self.min_threads, self.max_threads)
    }

    fn state(&self) -> PoolState {
        PoolState {
            name: self.name.clone(),
            current_size: self.current_size(),
            min_threads: self.min_threads,
            max_threads: self.max_threads,
        }
    }
}

impl fmt::Debug for ThreadPoolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolInfo")
            .field("name", &self.name)
            .field("min_threads", &self.min_threads)
            .field("max_threads", &self.max_threads)
            .finish_non_exhaustive()
    }
}

/// Snapshot of one registered pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolState {
    /// Registration name.
    pub name: String,
    /// Size reported by the pool's getter.
    pub current_size: usize,
    /// Lower bound.
    pub min_threads: usize,
    /// Upper bound.
    pub max_threads: usize,
}

/// Outcome of one control-law evaluation for one pool.
///
/// `proposed` is the proportional size after clamping; `target` is what the
/// loop applies once hysteresis has been taken into account.
///
/// # Examples
/// ```
/// use paraprop_core::SizeDecision;
///
/// // cpu 0.9 against a 0.6 target gives a ratio of 1.5.
/// let decision = SizeDecision::evaluate(8, 2, 16, 1.5, 0.2);
/// assert_eq!(decision.proposed, 7);
/// assert_eq!(decision.target, 8);
///
/// let decision = SizeDecision::evaluate(8, 2, 16, 2.0, 0.5);
/// assert_eq!(decision.target, 4);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeDecision {
    /// Size before the cycle.
    pub current: usize,
    /// Clamped proportional size.
    pub proposed: usize,
    /// Size to apply.
    pub target: usize,
}

impl SizeDecision {
    /// Applies the control law for a pool of size `current` bounded by
    /// `[min_threads, max_threads]`.
    ///
    /// Ratios above 1.1 shrink the pool by
    /// `current * (1 - factor * (ratio - 1))`, ratios below 0.9 grow it by
    /// `current * (1 + factor * (1 - ratio))`, and anything in between keeps
    /// the current size. A pool already inside its bounds keeps its size when
    /// the clamped proposal differs by fewer than [`HYSTERESIS_THREADS`]; a
    /// pool outside its bounds is always pulled back inside.
    #[must_use]
    pub fn evaluate(
        current: usize,
        min_threads: usize,
        max_threads: usize,
        constraint_ratio: f64,
        adjustment_factor: f64,
    ) -> Self {
        let scale = if constraint_ratio > SHRINK_ABOVE {
            1.0 - adjustment_factor * (constraint_ratio - 1.0)
        } else if constraint_ratio < GROW_BELOW {
            1.0 + adjustment_factor * (1.0 - constraint_ratio)
        } else {
            1.0
        };
        let proposed = floor_to_threads(current as f64 * scale).clamp(min_threads, max_threads);
        let in_bounds = (min_threads..=max_threads).contains(&current);
        let target = if in_bounds && proposed.abs_diff(current) < HYSTERESIS_THREADS {
            current
        } else {
            proposed
        };
        Self {
            current,
            proposed,
            target,
        }
    }

    /// Returns whether applying the decision changes the pool.
    #[must_use]
    pub fn changes_size(&self) -> bool {
        self.target != self.current
    }
}

/// Floors a scaled thread count, mapping negative and NaN values to zero and
/// saturating at `usize::MAX`.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "the value is floored and range-checked before the cast"
)]
fn floor_to_threads(scaled: f64) -> usize {
    let floored = scaled.floor();
    if floored.is_nan() || floored <= 0.0 {
        0
    } else if floored >= usize::MAX as f64 {
        usize::MAX
    } else {
        floored as usize
    }
}

/// Configuration for [`AdaptiveResourceManager`].
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveConfig {
    target_cpu_usage: f64,
    target_memory_usage: f64,
    adjustment_interval: Duration,
    adjustment_factor: f64,
    enable_logging: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            target_cpu_usage: 0.7,
            target_memory_usage: 0.6,
            adjustment_interval: Duration::from_secs(5),
            adjustment_factor: 0.2,
            enable_logging: false,
        }
    }
}

impl AdaptiveConfig {
    /// Sets the CPU usage fraction the loop steers toward.
    #[must_use]
    pub fn with_target_cpu_usage(mut self, target: f64) -> Self {
        self.target_cpu_usage = target;
        self
    }

    /// Sets the memory usage fraction the loop steers toward.
    #[must_use]
    pub fn with_target_memory_usage(mut self, target: f64) -> Self {
        self.target_memory_usage = target;
        self
    }

    /// Sets the delay between adjustment cycles.
    #[must_use]
    pub fn with_adjustment_interval(mut self, interval: Duration) -> Self {
        self.adjustment_interval = interval;
        self
    }

    /// Sets the proportional gain.
    #[must_use]
    pub fn with_adjustment_factor(mut self, factor: f64) -> Self {
        self.adjustment_factor = factor;
        self
    }

    /// Promotes adjustment records from `debug` to `info`.
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    /// Returns the CPU target.
    #[must_use]
    pub fn target_cpu_usage(&self) -> f64 {
        self.target_cpu_usage
    }

    /// Returns the memory target.
    #[must_use]
    pub fn target_memory_usage(&self) -> f64 {
        self.target_memory_usage
    }

    /// Returns the delay between cycles.
    #[must_use]
    pub fn adjustment_interval(&self) -> Duration {
        self.adjustment_interval
    }

    /// Returns the proportional gain.
    #[must_use]
    pub fn adjustment_factor(&self) -> f64 {
        self.adjustment_factor
    }

    /// Returns whether adjustments are logged at `info`.
    #[must_use]
    pub fn enable_logging(&self) -> bool {
        self.enable_logging
    }

    /// Returns `max(cpu / target_cpu, memory / target_memory)`.
    #[must_use]
    pub fn constraint_ratio(&self, metrics: &ResourceMetrics) -> f64 {
        let cpu = metrics.cpu_usage_percent / self.target_cpu_usage;
        let memory = metrics.memory_usage_percent / self.target_memory_usage;
        cpu.max(memory)
    }

    fn validate(&self) -> Result<()> {
        validate_fraction("target_cpu_usage", self.target_cpu_usage)?;
        validate_fraction("target_memory_usage", self.target_memory_usage)?;
        if self.adjustment_interval.is_zero() {
            return Err(ParapropError::invalid_config(
                "adjustment_interval must be greater than zero",
            ));
        }
        if !self.adjustment_factor.is_finite() || self.adjustment_factor < 0.0 {
            return Err(ParapropError::invalid_config(format!(
                "adjustment_factor must be a non-negative finite number, got {}",
                self.adjustment_factor
            )));
        }
        Ok(())
    }
}

struct ManagerShared {
    monitor: Arc<ResourceMonitor>,
    config: AdaptiveConfig,
    pools: Mutex<Vec<ThreadPoolInfo>>,
    running: AtomicBool,
    stop: StopSignal,
}

impl ManagerShared {
    fn lock_pools(&self) -> MutexGuard<'_, Vec<ThreadPoolInfo>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(name = "adaptive.adjust", level = "debug", skip(self))]
    fn adjust(&self) -> Vec<SizeDecision> {
        let metrics = self.monitor.get_current_metrics();
        let ratio = self.config.constraint_ratio(&metrics);
        let pools = self.lock_pools();
        pools
            .iter()
            .map(|pool| {
                let decision = SizeDecision::evaluate(
                    pool.current_size(),
                    pool.min_threads,
                    pool.max_threads,
                    ratio,
                    self.config.adjustment_factor,
                );
                if decision.changes_size() {
                    pool.apply_size(decision.target);
                    let reason = if decision.target < decision.current {
                        "resource pressure"
                    } else {
                        "spare capacity"
                    };
                    self.log_resize(pool, decision.current, decision.target, reason);
                }
                decision
            })
            .collect()
    }

    fn log_resize(&self, pool: &ThreadPoolInfo, old_size: usize, new_size: usize, reason: &str) {
        if self.config.enable_logging {
            info!(pool = %pool.name, old_size, new_size, reason, "thread pool resized");
        } else {
            debug!(pool = %pool.name, old_size, new_size, reason, "thread pool resized");
        }
        record_pool_size(&pool.name, new_size);
    }

    fn run(&self) {
        debug!(interval = ?self.config.adjustment_interval, "adaptive manager started");
        while !self.stop.wait(self.config.adjustment_interval) {
            self.adjust();
        }
        debug!("adaptive manager stopped");
    }
}

/// Periodically resizes registered pools from [`ResourceMonitor`] samples.
///
/// Manual overrides ([`scale_up`](Self::scale_up),
/// [`scale_down`](Self::scale_down), [`set_all_pools`](Self::set_all_pools))
/// apply immediately and are always clamped to each pool's bounds.
pub struct AdaptiveResourceManager {
    shared: Arc<ManagerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    owns_monitor: AtomicBool,
}

impl AdaptiveResourceManager {
    /// Creates a manager reading from `monitor`.
    ///
    /// # Errors
    /// Returns [`ParapropError::InvalidConfig`] for non-positive targets, a
    /// zero interval, or a negative factor.
    pub fn new(monitor: Arc<ResourceMonitor>, config: AdaptiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(ManagerShared {
                monitor,
                config,
                pools: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                stop: StopSignal::new(),
            }),
            worker: Mutex::new(None),
            owns_monitor: AtomicBool::new(false),
        })
    }

    /// Places `info` under management.
    ///
    /// # Errors
    /// Returns [`ParapropError::InvalidPoolBounds`] when `min_threads` is zero
    /// or greater than `max_threads`.
    pub fn register_thread_pool(&self, info: ThreadPoolInfo) -> Result<()> {
        if info.min_threads == 0 || info.min_threads > info.max_threads {
            return Err(ParapropError::InvalidPoolBounds {
                name: info.name,
                min: info.min_threads,
                max: info.max_threads,
            });
        }
        debug!(
            pool = %info.name,
            min = info.min_threads,
            max = info.max_threads,
            "registered thread pool"
        );
        self.shared.lock_pools().push(info);
        Ok(())
    }

    /// Starts the adjustment loop, starting the monitor first if it is idle.
    ///
    /// # Errors
    /// Returns [`ParapropError::WorkerSpawn`] when either background thread
    /// cannot be started.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.shared.monitor.is_running() {
            if let Err(error) = self.shared.monitor.start() {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(error);
            }
            self.owns_monitor.store(true, Ordering::SeqCst);
        }
        self.shared.stop.reset();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("paraprop-adaptive".to_owned())
            .spawn(move || shared.run());
        match spawned {
            Ok(handle) => {
                *self.lock_worker() = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.release_monitor();
                Err(ParapropError::spawn_failed("paraprop-adaptive", &error))
            }
        }
    }

    /// Stops the adjustment loop, and the monitor if this manager started it.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stop.request_stop();
        if let Some(handle) = self.lock_worker().take() {
            if handle.join().is_err() {
                warn!("adaptive manager thread exited with a panic");
            }
        }
        self.release_monitor();
    }

    /// Returns whether the adjustment loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Runs one adjustment cycle on the calling thread.
    ///
    /// Returns one decision per registered pool, in registration order.
    pub fn adjust_now(&self) -> Vec<SizeDecision> {
        self.shared.adjust()
    }

    /// Grows `pool` by `amount`, capped at its upper bound. Returns the
    /// applied size.
    ///
    /// # Errors
    /// Returns [`ParapropError::UnknownPool`] when no pool has that name.
    pub fn scale_up(&self, pool: &str, amount: usize) -> Result<usize> {
        self.resize_one(pool, "manual scale up", |current| {
            current.saturating_add(amount)
        })
    }

    /// Shrinks `pool` by `amount`, floored at its lower bound. Returns the
    /// applied size.
    ///
    /// # Errors
    /// Returns [`ParapropError::UnknownPool`] when no pool has that name.
    pub fn scale_down(&self, pool: &str, amount: usize) -> Result<usize> {
        self.resize_one(pool, "manual scale down", |current| {
            current.saturating_sub(amount)
        })
    }

    /// Sets every registered pool to `size`, clamped per pool.
    pub fn set_all_pools(&self, size: usize) {
        let pools = self.shared.lock_pools();
        for pool in pools.iter() {
            let current = pool.current_size();
            let target = pool.clamp(size);
            pool.apply_size(target);
            self.shared.log_resize(pool, current, target, "manual override");
        }
    }

    /// Returns a snapshot of every registered pool.
    #[must_use]
    pub fn get_pool_states(&self) -> Vec<PoolState> {
        self.shared.lock_pools().iter().map(ThreadPoolInfo::state).collect()
    }

    /// Returns the monitor feeding this manager.
    #[must_use]
    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.shared.monitor
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AdaptiveConfig {
        &self.shared.config
    }

    fn resize_one(
        &self,
        name: &str,
        reason: &str,
        next: impl FnOnce(usize) -> usize,
    ) -> Result<usize> {
        let pools = self.shared.lock_pools();
        let pool = pools
            .iter()
            .find(|pool| pool.name == name)
            .ok_or_else(|| ParapropError::UnknownPool {
                name: name.to_owned(),
            })?;
        let current = pool.current_size();
        let target = pool.clamp(next(current));
        pool.apply_size(target);
        self.shared.log_resize(pool, current, target, reason);
        Ok(target)
    }

    fn release_monitor(&self) {
        if self.owns_monitor.swap(false, Ordering::SeqCst) {
            self.shared.monitor.stop();
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AdaptiveResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveResourceManager")
            .field("config", &self.shared.config)
            .field("pools", &*self.shared.lock_pools())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for AdaptiveResourceManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "metrics")]
fn record_pool_size(pool: &str, size: usize) {
    metrics::gauge!("paraprop_pool_size", "pool" => pool.to_owned()).set(size as f64);
}

#[cfg(not(feature = "metrics"))]
fn record_pool_size(_pool: &str, _size: usize) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{monitor::MonitorConfig, telemetry::FixedCollector};
    use proptest::prelude::*;
    use rstest::rstest;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        collector: Arc<FixedCollector>,
        manager: AdaptiveResourceManager,
    }

    impl Fixture {
        fn new(config: AdaptiveConfig) -> Self {
            let collector = Arc::new(FixedCollector::new(0.0, 0.0));
            let monitor = ResourceMonitor::with_collector(
                MonitorConfig::default().with_alerts(false),
                Arc::clone(&collector) as Arc<dyn crate::telemetry::MetricsCollector>,
            )
            .expect("monitor configuration is valid");
            let manager = AdaptiveResourceManager::new(Arc::new(monitor), config)
                .expect("manager configuration is valid");
            Self { collector, manager }
        }

        fn observe(&self, cpu: f64, memory: f64) {
            self.collector.set(cpu, memory);
            self.manager.monitor().sample_now();
        }

        fn pool(&self, name: &str, size: usize, min: usize, max: usize) -> Arc<AtomicUsize> {
            let cell = Arc::new(AtomicUsize::new(size));
            let (read, write) = (Arc::clone(&cell), Arc::clone(&cell));
            self.manager
                .register_thread_pool(ThreadPoolInfo::new(
                    name,
                    move || read.load(Ordering::SeqCst),
                    move |n| write.store(n, Ordering::SeqCst),
                    min,
                    max,
                ))
                .expect("bounds are valid");
            cell
        }
    }

    #[test]
    fn overloaded_cpu_proposes_proportional_shrink() {
        let fixture = Fixture::new(AdaptiveConfig::default().with_target_cpu_usage(0.6));
        let size = fixture.pool("workers", 8, 2, 16);
        fixture.observe(0.9, 0.0);

        let decisions = fixture.manager.adjust_now();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].proposed, 7);
        // One thread is inside the hysteresis band.
        assert_eq!(decisions[0].target, 8);
        assert_eq!(size.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn heavy_pressure_shrinks_the_pool() {
        let fixture = Fixture::new(
            AdaptiveConfig::default()
                .with_target_cpu_usage(0.5)
                .with_adjustment_factor(0.5),
        );
        let size = fixture.pool("workers", 12, 2, 16);
        fixture.observe(1.0, 0.0);

        fixture.manager.adjust_now();
        assert_eq!(size.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn idle_system_grows_the_pool() {
        let fixture = Fixture::new(AdaptiveConfig::default().with_adjustment_factor(0.5));
        let size = fixture.pool("workers", 8, 2, 16);
        fixture.observe(0.0, 0.0);

        fixture.manager.adjust_now();
        assert_eq!(size.load(Ordering::SeqCst), 12);
    }

    #[rstest]
    #[case(0.64)]
    #[case(0.7)]
    #[case(0.76)]
    fn usage_within_band_never_resizes(#[case] cpu: f64) {
        let fixture = Fixture::new(AdaptiveConfig::default().with_adjustment_factor(1.0));
        let size = fixture.pool("workers", 8, 1, 64);
        for _ in 0..5 {
            fixture.observe(cpu, 0.0);
            fixture.manager.adjust_now();
            assert_eq!(size.load(Ordering::SeqCst), 8);
        }
    }

    #[test]
    fn memory_pressure_dominates_when_larger() {
        let config = AdaptiveConfig::default();
        let metrics = ResourceMetrics::now(0.35, 0.9);
        assert!((config.constraint_ratio(&metrics) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn manual_overrides_are_clamped() {
        let fixture = Fixture::new(AdaptiveConfig::default());
        let io = fixture.pool("io", 4, 2, 6);
        let cpu = fixture.pool("cpu", 4, 3, 10);

        assert_eq!(fixture.manager.scale_up("io", 10).expect("pool exists"), 6);
        assert_eq!(fixture.manager.scale_down("io", 10).expect("pool exists"), 2);
        fixture.manager.set_all_pools(1);
        assert_eq!(io.load(Ordering::SeqCst), 2);
        assert_eq!(cpu.load(Ordering::SeqCst), 3);

        let states = fixture.manager.get_pool_states();
        assert_eq!(
            states.iter().map(|s| s.current_size).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn unknown_pool_is_reported() {
        let fixture = Fixture::new(AdaptiveConfig::default());
        let err = fixture
            .manager
            .scale_up("missing", 1)
            .expect_err("pool is not registered");
        assert_eq!(err.code().as_str(), "PARAPROP_UNKNOWN_POOL");
    }

    #[rstest]
    #[case(6.9, 6)]
    #[case(-3.0, 0)]
    #[case(f64::NAN, 0)]
    #[case(f64::INFINITY, usize::MAX)]
    fn scaled_counts_floor_and_saturate(#[case] scaled: f64, #[case] expected: usize) {
        assert_eq!(floor_to_threads(scaled), expected);
    }

    #[rstest]
    #[case(0, 4)]
    #[case(5, 4)]
    fn rejects_unusable_bounds(#[case] min: usize, #[case] max: usize) {
        let fixture = Fixture::new(AdaptiveConfig::default());
        let err = fixture
            .manager
            .register_thread_pool(ThreadPoolInfo::new("bad", || 1, |_| {}, min, max))
            .expect_err("bounds must be rejected");
        assert!(matches!(err, ParapropError::InvalidPoolBounds { .. }));
    }

    #[rstest]
    #[case(AdaptiveConfig::default().with_target_cpu_usage(0.0))]
    #[case(AdaptiveConfig::default().with_adjustment_interval(Duration::ZERO))]
    #[case(AdaptiveConfig::default().with_adjustment_factor(f64::NAN))]
    fn rejects_invalid_configuration(#[case] config: AdaptiveConfig) {
        let monitor = ResourceMonitor::with_collector(
            MonitorConfig::default(),
            Arc::new(FixedCollector::new(0.0, 0.0)),
        )
        .expect("monitor configuration is valid");
        let err = AdaptiveResourceManager::new(Arc::new(monitor), config)
            .expect_err("configuration must be rejected");
        assert!(matches!(err, ParapropError::InvalidConfig { .. }));
    }

    #[test]
    fn start_owns_and_releases_an_idle_monitor() {
        let fixture = Fixture::new(
            AdaptiveConfig::default().with_adjustment_interval(Duration::from_millis(5)),
        );
        fixture.manager.start().expect("manager must start");
        assert!(fixture.manager.is_running());
        assert!(fixture.manager.monitor().is_running());
        fixture.manager.stop();
        assert!(!fixture.manager.is_running());
        assert!(!fixture.manager.monitor().is_running());
    }

    #[test]
    fn out_of_bounds_pool_is_pulled_inside() {
        let decision = SizeDecision::evaluate(17, 2, 16, 1.0, 0.2);
        assert_eq!(decision.target, 16);
    }

    proptest! {
        #[test]
        fn decisions_stay_within_bounds(
            current in 0usize..256,
            min in 1usize..32,
            span in 0usize..64,
            ratio in prop_oneof![Just(f64::NAN), 0.0f64..10.0],
            factor in 0.0f64..2.0,
        ) {
            let max = min + span;
            let decision = SizeDecision::evaluate(current, min, max, ratio, factor);
            prop_assert!((min..=max).contains(&decision.target));
            if !(min..=max).contains(&current) {
                prop_assert_eq!(decision.target, decision.proposed);
            }
        }

        #[test]
        fn ratios_inside_band_keep_size(
            current in 1usize..128,
            ratio in 0.9f64..=1.1,
            factor in 0.0f64..2.0,
        ) {
            let decision = SizeDecision::evaluate(current, 1, 128, ratio, factor);
            prop_assert_eq!(decision.target, current);
        }
    }
}
