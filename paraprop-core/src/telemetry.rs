//! Resource telemetry collection.
//!
//! Platform accounting sits behind [`MetricsCollector::collect_one_sample`] so
//! the monitor, runner, and manager stay platform-agnostic. Each collector
//! keeps its own CPU bookkeeping, which keeps independent monitors from
//! influencing one another.

use std::{
    sync::{Mutex, PoisonError},
    thread,
    time::{Instant, SystemTime},
};

#[cfg(target_os = "linux")]
use std::fs;

use thiserror::Error;
use tracing::debug;

/// One sampling cycle's view of the process.
///
/// Usage values are fractions in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResourceMetrics {
    /// Process CPU time over wall time, normalized by available parallelism.
    pub cpu_usage_percent: f64,
    /// Resident set size over total physical memory.
    pub memory_usage_percent: f64,
    /// Resident set size in bytes.
    pub memory_usage_bytes: u64,
    /// Memory the kernel reports as available, in bytes.
    pub available_memory_bytes: u64,
    /// Threads in the process.
    pub num_threads: usize,
    /// Wall-clock time the sample was taken.
    pub timestamp: SystemTime,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        Self {
            cpu_usage_percent: 0.0,
            memory_usage_percent: 0.0,
            memory_usage_bytes: 0,
            available_memory_bytes: 0,
            num_threads: 0,
            timestamp: SystemTime::UNIX_EPOCH,
        }
    }
}

impl ResourceMetrics {
    /// Creates a sample stamped with the current time.
    ///
    /// # Examples
    /// ```
    /// use paraprop_core::ResourceMetrics;
    ///
    /// let sample = ResourceMetrics::now(0.25, 0.5);
    /// assert_eq!(sample.cpu_usage_percent, 0.25);
    /// assert_eq!(sample.memory_usage_percent, 0.5);
    /// ```
    #[must_use]
    pub fn now(cpu_usage_percent: f64, memory_usage_percent: f64) -> Self {
        Self {
            cpu_usage_percent,
            memory_usage_percent,
            timestamp: SystemTime::now(),
            ..Self::default()
        }
    }
}

/// Source of [`ResourceMetrics`] samples.
///
/// Closures returning [`ResourceMetrics`] implement the trait, which makes
/// scripted telemetry easy to inject.
pub trait MetricsCollector: Send + Sync {
    /// Takes one sample.
    fn collect_one_sample(&self) -> ResourceMetrics;
}

impl<F> MetricsCollector for F
where
    F: Fn() -> ResourceMetrics + Send + Sync,
{
    fn collect_one_sample(&self) -> ResourceMetrics {
        self()
    }
}

/// Collector that always reports the most recently configured usage.
///
/// # Examples
/// ```
/// use paraprop_core::{FixedCollector, MetricsCollector};
///
/// let collector = FixedCollector::new(0.9, 0.1);
/// assert_eq!(collector.collect_one_sample().cpu_usage_percent, 0.9);
/// collector.set(0.2, 0.1);
/// assert_eq!(collector.collect_one_sample().cpu_usage_percent, 0.2);
/// ```
#[derive(Debug)]
pub struct FixedCollector {
    usage: Mutex<(f64, f64)>,
}

impl FixedCollector {
    /// Creates a collector reporting the given CPU and memory fractions.
    #[must_use]
    pub fn new(cpu_usage: f64, memory_usage: f64) -> Self {
        Self {
            usage: Mutex::new((cpu_usage, memory_usage)),
        }
    }

    /// Replaces the reported usage.
    pub fn set(&self, cpu_usage: f64, memory_usage: f64) {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner) = (cpu_usage, memory_usage);
    }
}

impl MetricsCollector for FixedCollector {
    fn collect_one_sample(&self) -> ResourceMetrics {
        let (cpu, memory) = *self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        ResourceMetrics::now(cpu, memory)
    }
}

/// Errors raised while reading process accounting from `/proc`.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    /// Any input/output failure while reading process information.
    #[error("telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A required key was missing.
    #[error("missing field `{field}` in {file}")]
    MissingProcField {
        file: &'static str,
        field: &'static str,
    },
    /// A numeric field could not be parsed.
    #[error("invalid numeric value `{value}` for /proc field `{field}`")]
    InvalidProcField { field: &'static str, value: String },
    /// A field had an unexpected unit.
    #[error("unsupported unit `{unit}` for /proc field `{field}`")]
    UnsupportedProcUnit { field: &'static str, unit: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ProcSnapshot {
    cpu_ticks: u64,
    num_threads: usize,
    rss_bytes: u64,
    total_memory_bytes: u64,
    available_memory_bytes: u64,
}

#[derive(Debug)]
struct CpuBaseline {
    at: Instant,
    cpu_ticks: u64,
}

/// Collector backed by operating-system accounting.
///
/// On Linux it reads `/proc/self/stat`, `/proc/self/status`, and
/// `/proc/meminfo`. CPU usage is the delta of process CPU time since this
/// collector's previous sample, so the first sample reports zero. Other
/// platforms report zero usage.
#[derive(Debug)]
pub struct SystemCollector {
    parallelism: usize,
    baseline: Mutex<Option<CpuBaseline>>,
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCollector {
    /// Creates a collector with no CPU baseline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parallelism: thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            baseline: Mutex::new(None),
        }
    }

    fn cpu_fraction(&self, cpu_ticks: u64, now: Instant) -> f64 {
        let mut baseline = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
        let usage = baseline.as_ref().map_or(0.0, |previous| {
            cpu_usage_between(previous, cpu_ticks, now, self.parallelism)
        });
        *baseline = Some(CpuBaseline { at: now, cpu_ticks });
        usage
    }
}

impl MetricsCollector for SystemCollector {
    fn collect_one_sample(&self) -> ResourceMetrics {
        let now = Instant::now();
        let snapshot = match read_proc_snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                debug!(%error, "falling back to empty telemetry sample");
                ProcSnapshot::default()
            }
        };
        let cpu_usage_percent = self.cpu_fraction(snapshot.cpu_ticks, now);
        ResourceMetrics {
            cpu_usage_percent,
            memory_usage_percent: ratio(snapshot.rss_bytes, snapshot.total_memory_bytes),
            memory_usage_bytes: snapshot.rss_bytes,
            available_memory_bytes: snapshot.available_memory_bytes,
            num_threads: snapshot.num_threads,
            timestamp: SystemTime::now(),
        }
    }
}

/// Kernel clock ticks per second as exposed through `/proc` (`USER_HZ`).
const USER_HZ: f64 = 100.0;

fn cpu_usage_between(
    previous: &CpuBaseline,
    cpu_ticks: u64,
    now: Instant,
    parallelism: usize,
) -> f64 {
    let elapsed = now.saturating_duration_since(previous.at).as_secs_f64();
    if elapsed <= 0.0 || parallelism == 0 {
        return 0.0;
    }
    let cpu_seconds = cpu_ticks.saturating_sub(previous.cpu_ticks) as f64 / USER_HZ;
    (cpu_seconds / elapsed / parallelism as f64).clamp(0.0, 1.0)
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(target_os = "linux")]
fn read_proc_snapshot() -> Result<ProcSnapshot, TelemetryError> {
    let stat = fs::read_to_string("/proc/self/stat")?;
    let status = fs::read_to_string("/proc/self/status")?;
    let meminfo = fs::read_to_string("/proc/meminfo")?;
    let (cpu_ticks, num_threads) = parse_stat(&stat)?;
    Ok(ProcSnapshot {
        cpu_ticks,
        num_threads,
        rss_bytes: parse_kibibyte_field(&status, "/proc/self/status", "VmRSS")?,
        total_memory_bytes: parse_kibibyte_field(&meminfo, "/proc/meminfo", "MemTotal")?,
        available_memory_bytes: parse_kibibyte_field(&meminfo, "/proc/meminfo", "MemAvailable")?,
    })
}

#[cfg(not(target_os = "linux"))]
fn read_proc_snapshot() -> Result<ProcSnapshot, TelemetryError> {
    Ok(ProcSnapshot::default())
}

/// Extracts `utime + stime` and `num_threads` from `/proc/self/stat`.
///
/// The command name may contain spaces, so fields are counted after the last
/// closing parenthesis, where the process state (field 3) begins.
#[cfg_attr(not(target_os = "linux"), allow(dead_code, reason = "parsed only on Linux"))]
fn parse_stat(stat: &str) -> Result<(u64, usize), TelemetryError> {
    let missing = |field| TelemetryError::MissingProcField {
        file: "/proc/self/stat",
        field,
    };
    let rest = stat
        .rfind(')')
        .and_then(|index| stat.get(index + 1..))
        .ok_or_else(|| missing("comm"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |position: usize, name: &'static str| {
        fields.get(position - 3).copied().ok_or_else(|| missing(name))
    };
    let utime = parse_number::<u64>(field(14, "utime")?, "utime")?;
    let stime = parse_number::<u64>(field(15, "stime")?, "stime")?;
    let threads = parse_number::<usize>(field(20, "num_threads")?, "num_threads")?;
    Ok((utime.saturating_add(stime), threads))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code, reason = "parsed only on Linux"))]
fn parse_kibibyte_field(
    contents: &str,
    file: &'static str,
    field: &'static str,
) -> Result<u64, TelemetryError> {
    let line = contents
        .lines()
        .find(|candidate| {
            candidate
                .strip_prefix(field)
                .is_some_and(|rest| rest.starts_with(':'))
        })
        .ok_or(TelemetryError::MissingProcField { file, field })?;
    let mut parts = line.split_whitespace();
    let _label = parts.next();
    let value_raw = parts
        .next()
        .ok_or(TelemetryError::MissingProcField { file, field })?;
    let unit = parts.next().unwrap_or("kB");
    if unit != "kB" {
        return Err(TelemetryError::UnsupportedProcUnit {
            field,
            unit: unit.to_owned(),
        });
    }
    Ok(parse_number::<u64>(value_raw, field)?.saturating_mul(1024))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code, reason = "parsed only on Linux"))]
fn parse_number<T: std::str::FromStr>(raw: &str, field: &'static str) -> Result<T, TelemetryError> {
    raw.parse::<T>()
        .map_err(|_| TelemetryError::InvalidProcField {
            field,
            value: raw.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    const STAT: &str = "4242 (cargo test (x)) S 1 4242 4242 0 -1 4194560 900 0 0 0 \
                        150 50 0 0 20 0 7 0 1000 123456 300 18446744073709551615";

    #[test]
    fn parse_stat_reads_cpu_ticks_and_threads() {
        let (ticks, threads) = parse_stat(STAT).expect("stat line must parse");
        assert_eq!(ticks, 200);
        assert_eq!(threads, 7);
    }

    #[test]
    fn parse_stat_rejects_truncated_lines() {
        let err = parse_stat("1 (x) S 1 2").expect_err("truncated stat must fail");
        assert!(matches!(err, TelemetryError::MissingProcField { field: "utime", .. }));
    }

    #[rstest]
    #[case("VmRSS:\t1234 kB\nName:\tparaprop\n", "VmRSS", 1_263_616)]
    #[case("MemTotal: 42 kB\nMemAvailable: 7 kB\n", "MemAvailable", 7_168)]
    fn parse_kibibyte_field_accepts_valid_lines(
        #[case] contents: &str,
        #[case] field: &'static str,
        #[case] expected: u64,
    ) {
        let bytes = parse_kibibyte_field(contents, "test", field).expect("field must parse");
        assert_eq!(bytes, expected);
    }

    #[rstest]
    #[case::missing("Name:\tparaprop\n")]
    #[case::prefix_only("VmRSSx:\t12 kB\n")]
    #[case::bad_number("VmRSS:\tlots kB\n")]
    #[case::bad_unit("VmRSS:\t12 MB\n")]
    fn parse_kibibyte_field_rejects_invalid_input(#[case] contents: &str) {
        assert!(parse_kibibyte_field(contents, "test", "VmRSS").is_err());
    }

    #[test]
    fn cpu_usage_is_normalized_and_clamped() {
        let start = Instant::now();
        let baseline = CpuBaseline {
            at: start,
            cpu_ticks: 0,
        };
        let later = start + Duration::from_secs(1);
        assert!((cpu_usage_between(&baseline, 100, later, 2) - 0.5).abs() < 1e-9);
        assert!((cpu_usage_between(&baseline, 1_000, later, 2) - 1.0).abs() < 1e-9);
        assert!(cpu_usage_between(&baseline, 100, start, 2).abs() < f64::EPSILON);
    }

    #[test]
    fn separate_collectors_keep_separate_baselines() {
        let first = SystemCollector::new();
        let second = SystemCollector::new();
        let _ = first.collect_one_sample();
        let sample = second.collect_one_sample();
        assert!(sample.cpu_usage_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn closures_are_collectors() {
        let collector = || ResourceMetrics::now(0.3, 0.4);
        let sample = collector.collect_one_sample();
        assert!((sample.memory_usage_percent - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_handles_zero_denominator() {
        assert!(ratio(5, 0).abs() < f64::EPSILON);
    }
}
