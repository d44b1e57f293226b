//! Parallel property-test execution core.
//!
//! Runs many independent property checks concurrently on a worker pool with
//! per-check timeouts, throttles admission from sampled CPU and memory
//! telemetry, resizes registered pools toward utilisation targets, spreads
//! work across several runners, and shrinks failing inputs to a minimal
//! counterexample.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod adaptive;
mod config;
mod distributor;
mod error;
mod minimizer;
mod monitor;
mod property;
#[cfg(feature = "proptest")]
mod proptest_property;
mod result;
mod runner;
mod signal;
mod storage;
mod telemetry;
mod thread_pool;

pub use crate::{
    adaptive::{
        AdaptiveConfig, AdaptiveResourceManager, HYSTERESIS_THREADS, PoolState, SizeDecision,
        ThreadPoolInfo,
    },
    config::{RunnerConfig, TestExecutionConfig},
    distributor::{DistributionStrategy, RunnerSelector, TestDistributor},
    error::{ParapropError, ParapropErrorCode, Result},
    minimizer::{
        CounterexampleMinimizer, MinimizationResult, MinimizerConfig, ShrinkFunction, shrinkers,
    },
    monitor::{AlertCallback, MonitorConfig, ResourceMonitor},
    property::{CancellationToken, CheckContext, FnProperty, Property, PropertyFailure},
    result::{FailureKind, TestResult, TestSuite},
    runner::{ParallelTestRunner, TestTask},
    storage::{CounterexampleStore, StoredCounterexample, persist_counterexamples, replay_latest},
    telemetry::{FixedCollector, MetricsCollector, ResourceMetrics, SystemCollector},
    thread_pool::{TaskHandle, ThreadPool},
};

#[cfg(feature = "proptest")]
#[cfg_attr(docsrs, doc(cfg(feature = "proptest")))]
pub use crate::proptest_property::StrategyProperty;
