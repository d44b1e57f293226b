use std::sync::Arc;

use paraprop_core::{MetricsCollector, ParallelTestRunner, RunnerConfig};
use paraprop_test_support::{ci::run_profile::RunProfile, logging::init_logging};

const DEFAULT_THREADS: usize = 4;
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_CASES: u32 = 64;

fn install_logging() {
    init_logging().expect("PARAPROP_LOG_FORMAT must name a supported format");
}

/// Suite sizing with any CI overrides applied.
#[must_use]
#[allow(dead_code, reason = "not every suite reads the profile directly")]
pub fn profile() -> RunProfile {
    install_logging();
    RunProfile::load(DEFAULT_THREADS, DEFAULT_TIMEOUT_MS, DEFAULT_CASES)
}

/// Runner without a monitor, so admission never waits on telemetry.
///
/// `threads` overrides the profile for tests that depend on an exact width.
#[must_use]
#[allow(dead_code, reason = "not every suite needs a plain runner")]
pub fn plain_runner(threads: usize) -> ParallelTestRunner {
    ParallelTestRunner::new(
        profile()
            .runner_config()
            .with_num_threads(threads)
            .with_adaptive_scheduling(false),
    )
    .expect("plain runner configuration is valid")
}

/// Monitor-free runner sized entirely by the profile.
#[must_use]
#[allow(dead_code, reason = "not every suite runs at profile width")]
pub fn profiled_runner() -> ParallelTestRunner {
    ParallelTestRunner::new(profile().runner_config().with_adaptive_scheduling(false))
        .expect("profiled runner configuration is valid")
}

/// Adaptive runner whose owned monitor reads from `collector`.
#[must_use]
#[allow(dead_code, reason = "not every suite drives telemetry")]
pub fn scripted_runner(
    config: RunnerConfig,
    collector: Arc<dyn MetricsCollector>,
) -> ParallelTestRunner {
    install_logging();
    ParallelTestRunner::with_collector(config, collector)
        .expect("scripted runner configuration is valid")
}
