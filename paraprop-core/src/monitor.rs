//! Background resource sampling with bounded history and edge-triggered
//! alerts.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use tracing::{debug, warn};

use crate::{
    config::validate_fraction,
    error::{ParapropError, Result},
    signal::StopSignal,
    telemetry::{MetricsCollector, ResourceMetrics, SystemCollector},
};

/// Callback invoked with the triggering sample and a human-readable message.
pub type AlertCallback = Arc<dyn Fn(&ResourceMetrics, &str) + Send + Sync>;

/// Configuration for [`ResourceMonitor`].
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    sampling_interval: Duration,
    history_size: usize,
    enable_alerts: bool,
    cpu_alert_threshold: f64,
    memory_alert_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(500),
            history_size: 60,
            enable_alerts: true,
            cpu_alert_threshold: 0.9,
            memory_alert_threshold: 0.85,
        }
    }
}

impl MonitorConfig {
    /// Sets the delay between samples.
    #[must_use]
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Sets how many samples the history retains.
    #[must_use]
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Enables or disables alert evaluation.
    #[must_use]
    pub fn with_alerts(mut self, enabled: bool) -> Self {
        self.enable_alerts = enabled;
        self
    }

    /// Sets the CPU usage fraction that raises an alert.
    #[must_use]
    pub fn with_cpu_alert_threshold(mut self, threshold: f64) -> Self {
        self.cpu_alert_threshold = threshold;
        self
    }

    /// Sets the memory usage fraction that raises an alert.
    #[must_use]
    pub fn with_memory_alert_threshold(mut self, threshold: f64) -> Self {
        self.memory_alert_threshold = threshold;
        self
    }

    /// Returns the delay between samples.
    #[must_use]
    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    /// Returns the history capacity.
    #[must_use]
    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Returns whether alerts are evaluated.
    #[must_use]
    pub fn enable_alerts(&self) -> bool {
        self.enable_alerts
    }

    /// Returns the initial CPU alert threshold.
    #[must_use]
    pub fn cpu_alert_threshold(&self) -> f64 {
        self.cpu_alert_threshold
    }

    /// Returns the initial memory alert threshold.
    #[must_use]
    pub fn memory_alert_threshold(&self) -> f64 {
        self.memory_alert_threshold
    }

    fn validate(&self) -> Result<()> {
        if self.sampling_interval.is_zero() {
            return Err(ParapropError::invalid_config(
                "sampling_interval must be greater than zero",
            ));
        }
        if self.history_size == 0 {
            return Err(ParapropError::invalid_config(
                "history_size must be greater than zero",
            ));
        }
        validate_fraction("cpu_alert_threshold", self.cpu_alert_threshold)?;
        validate_fraction("memory_alert_threshold", self.memory_alert_threshold)
    }
}

/// Edge-trigger state for one metric: fires once above the threshold and
/// re-arms only after the metric returns to or below it.
#[derive(Debug)]
struct AlertLatch {
    threshold: f64,
    armed: bool,
}

impl AlertLatch {
    const fn new(threshold: f64) -> Self {
        Self {
            threshold,
            armed: true,
        }
    }

    fn observe(&mut self, value: f64) -> bool {
        if value > self.threshold {
            let fire = self.armed;
            self.armed = false;
            fire
        } else {
            self.armed = true;
            false
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    current: ResourceMetrics,
    history: VecDeque<ResourceMetrics>,
    cpu: AlertLatch,
    memory: AlertLatch,
}

struct MonitorShared {
    config: MonitorConfig,
    collector: Arc<dyn MetricsCollector>,
    state: Mutex<MonitorState>,
    alert: Mutex<Option<AlertCallback>>,
    running: AtomicBool,
    stop: StopSignal,
}

impl MonitorShared {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sample(&self) -> ResourceMetrics {
        let metrics = self.collector.collect_one_sample();
        self.record(metrics);
        metrics
    }

    fn record(&self, metrics: ResourceMetrics) {
        let messages = {
            let mut state = self.lock_state();
            state.current = metrics;
            if state.history.len() >= self.config.history_size {
                state.history.pop_front();
            }
            state.history.push_back(metrics);
            if self.config.enable_alerts {
                evaluate_alerts(&mut state, &metrics)
            } else {
                Vec::new()
            }
        };
        if messages.is_empty() {
            return;
        }
        let callback = self
            .alert
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for message in messages {
            warn!(
                cpu = metrics.cpu_usage_percent,
                memory = metrics.memory_usage_percent,
                "{message}"
            );
            if let Some(callback) = &callback {
                callback(&metrics, &message);
            }
        }
    }

    fn run(&self) {
        debug!(interval = ?self.config.sampling_interval, "resource monitor started");
        loop {
            self.sample();
            if self.stop.wait(self.config.sampling_interval) {
                break;
            }
        }
        debug!("resource monitor stopped");
    }
}

fn evaluate_alerts(state: &mut MonitorState, metrics: &ResourceMetrics) -> Vec<String> {
    let mut messages = Vec::new();
    if state.cpu.observe(metrics.cpu_usage_percent) {
        messages.push(format!(
            "CPU usage exceeded threshold: {:.1}%",
            metrics.cpu_usage_percent * 100.0
        ));
    }
    if state.memory.observe(metrics.memory_usage_percent) {
        messages.push(format!(
            "Memory usage exceeded threshold: {:.1}%",
            metrics.memory_usage_percent * 100.0
        ));
    }
    messages
}

/// Samples process telemetry on a background thread.
///
/// Readers always receive copies, never references into the shared state.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use paraprop_core::{FixedCollector, MonitorConfig, ResourceMonitor};
///
/// let monitor = ResourceMonitor::with_collector(
///     MonitorConfig::default().with_history_size(2),
///     Arc::new(FixedCollector::new(0.5, 0.25)),
/// )
/// .expect("configuration is valid");
/// for _ in 0..3 {
///     monitor.sample_now();
/// }
/// assert_eq!(monitor.get_history().len(), 2);
/// assert_eq!(monitor.get_current_metrics().cpu_usage_percent, 0.5);
/// ```
pub struct ResourceMonitor {
    shared: Arc<MonitorShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceMonitor {
    /// Creates a monitor backed by [`SystemCollector`].
    ///
    /// # Errors
    /// Returns [`ParapropError::InvalidConfig`] for a zero sampling interval,
    /// an empty history, or non-positive thresholds.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_collector(config, Arc::new(SystemCollector::new()))
    }

    /// Creates a monitor that samples through `collector`.
    ///
    /// # Errors
    /// See [`ResourceMonitor::new`].
    pub fn with_collector(
        config: MonitorConfig,
        collector: Arc<dyn MetricsCollector>,
    ) -> Result<Self> {
        config.validate()?;
        let state = MonitorState {
            current: ResourceMetrics::default(),
            history: VecDeque::with_capacity(config.history_size),
            cpu: AlertLatch::new(config.cpu_alert_threshold),
            memory: AlertLatch::new(config.memory_alert_threshold),
        };
        Ok(Self {
            shared: Arc::new(MonitorShared {
                config,
                collector,
                state: Mutex::new(state),
                alert: Mutex::new(None),
                running: AtomicBool::new(false),
                stop: StopSignal::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Starts the sampling loop. Calling it while running is a no-op.
    ///
    /// # Errors
    /// Returns [`ParapropError::WorkerSpawn`] when the sampling thread cannot
    /// be started.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.stop.reset();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("paraprop-monitor".to_owned())
            .spawn(move || shared.run());
        match spawned {
            Ok(handle) => {
                *self.lock_worker() = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(ParapropError::spawn_failed("paraprop-monitor", &error))
            }
        }
    }

    /// Stops the sampling loop and joins its thread. No-op when not running.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stop.request_stop();
        if let Some(handle) = self.lock_worker().take() {
            if handle.join().is_err() {
                warn!("resource monitor thread exited with a panic");
            }
        }
    }

    /// Returns whether the sampling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Runs one sampling cycle on the calling thread and returns the sample.
    pub fn sample_now(&self) -> ResourceMetrics {
        self.shared.sample()
    }

    /// Records an externally collected sample as if the loop had taken it.
    pub fn record_sample(&self, metrics: ResourceMetrics) {
        self.shared.record(metrics);
    }

    /// Returns the latest sample.
    #[must_use]
    pub fn get_current_metrics(&self) -> ResourceMetrics {
        self.shared.lock_state().current
    }

    /// Returns a copy of the sample history, oldest first.
    #[must_use]
    pub fn get_history(&self) -> Vec<ResourceMetrics> {
        self.shared.lock_state().history.iter().copied().collect()
    }

    /// Mean CPU usage over samples no older than `window`; zero when empty.
    #[must_use]
    pub fn get_average_cpu_usage(&self, window: Duration) -> f64 {
        self.windowed(window, |metrics| metrics.cpu_usage_percent, mean)
    }

    /// Mean memory usage over samples no older than `window`; zero when empty.
    #[must_use]
    pub fn get_average_memory_usage(&self, window: Duration) -> f64 {
        self.windowed(window, |metrics| metrics.memory_usage_percent, mean)
    }

    /// Peak CPU usage over samples no older than `window`; zero when empty.
    #[must_use]
    pub fn get_peak_cpu_usage(&self, window: Duration) -> f64 {
        self.windowed(window, |metrics| metrics.cpu_usage_percent, peak)
    }

    /// Peak memory usage over samples no older than `window`; zero when empty.
    #[must_use]
    pub fn get_peak_memory_usage(&self, window: Duration) -> f64 {
        self.windowed(window, |metrics| metrics.memory_usage_percent, peak)
    }

    /// Registers the alert notifier, replacing any previous one.
    pub fn set_alert_callback<F>(&self, callback: F)
    where
        F: Fn(&ResourceMetrics, &str) + Send + Sync + 'static,
    {
        *self
            .shared
            .alert
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Replaces the CPU alert threshold.
    pub fn set_cpu_threshold(&self, threshold: f64) {
        self.shared.lock_state().cpu.threshold = threshold;
    }

    /// Replaces the memory alert threshold.
    pub fn set_memory_threshold(&self, threshold: f64) {
        self.shared.lock_state().memory.threshold = threshold;
    }

    /// Projects when resident memory reaches `limit_bytes`.
    ///
    /// Fits a least-squares line of `memory_usage_bytes` against elapsed time
    /// over the whole history. Returns `None` ("no limit reached") when fewer
    /// than two samples exist, the fitted slope is not positive, or the
    /// projection is too far out for a `Duration` to hold. Returns
    /// `Some(Duration::ZERO)` when current usage already exceeds the limit.
    #[must_use]
    pub fn estimate_time_to_memory_limit(&self, limit_bytes: u64) -> Option<Duration> {
        let state = self.shared.lock_state();
        let first = state.history.front()?.timestamp;
        let points: Vec<(f64, f64)> = state
            .history
            .iter()
            .map(|metrics| {
                let elapsed = metrics
                    .timestamp
                    .duration_since(first)
                    .unwrap_or_default()
                    .as_secs_f64()
                    * 1000.0;
                (elapsed, metrics.memory_usage_bytes as f64)
            })
            .collect();
        let slope = least_squares_slope(&points)?;
        if slope <= 0.0 {
            return None;
        }
        let current = state.history.back()?.memory_usage_bytes as f64;
        let remaining_ms = (limit_bytes as f64 - current) / slope;
        if remaining_ms < 0.0 {
            return Some(Duration::ZERO);
        }
        Duration::try_from_secs_f64(remaining_ms / 1000.0).ok()
    }

    /// Returns whether the latest sample exceeds either alert threshold.
    #[must_use]
    pub fn is_resource_constrained(&self) -> bool {
        let state = self.shared.lock_state();
        state.current.cpu_usage_percent > state.cpu.threshold
            || state.current.memory_usage_percent > state.memory.threshold
    }

    /// Returns the configuration this monitor was built with.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    fn windowed(
        &self,
        window: Duration,
        field: impl Fn(&ResourceMetrics) -> f64,
        reduce: fn(&[f64]) -> f64,
    ) -> f64 {
        let cutoff = SystemTime::now().checked_sub(window);
        let state = self.shared.lock_state();
        let values: Vec<f64> = state
            .history
            .iter()
            .rev()
            .take_while(|metrics| cutoff.is_none_or(|cutoff| metrics.timestamp >= cutoff))
            .map(field)
            .collect();
        reduce(&values)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn peak(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

fn least_squares_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let (sum_x, sum_y, sum_xy, sum_x2) = points.iter().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(sx, sy, sxy, sx2), &(x, y)| (sx + x, sy + y, sxy + x * y, sx2 + x * x),
    );
    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return None;
    }
    Some((n * sum_xy - sum_x * sum_y) / denominator)
}
