//! Suite sizing overrides read from the environment.
//!
//! CI jobs shrink or grow parallel suites without code changes. Invalid
//! overrides are logged and replaced by the caller's defaults.

use std::{env, str::FromStr, time::Duration};

use paraprop_core::{RunnerConfig, TestExecutionConfig};

/// Worker count override; `0` selects hardware concurrency.
pub const THREADS_ENV_KEY: &str = "PARAPROP_THREADS";
/// Per-check timeout override in milliseconds.
pub const TIMEOUT_MS_ENV_KEY: &str = "PARAPROP_TIMEOUT_MS";
/// Cases-per-property override.
pub const CASES_ENV_KEY: &str = "PARAPROP_CASES";

/// Resolved sizing for one suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunProfile {
    threads: usize,
    timeout_ms: u64,
    cases: u32,
}

impl RunProfile {
    /// Reads overrides, falling back to the given defaults.
    ///
    /// # Examples
    /// ```
    /// use paraprop_test_support::ci::run_profile::RunProfile;
    ///
    /// let profile = RunProfile::load(2, 500, 32);
    /// assert!(profile.timeout_ms() > 0);
    /// assert!(profile.cases() > 0);
    /// ```
    #[must_use]
    pub fn load(default_threads: usize, default_timeout_ms: u64, default_cases: u32) -> Self {
        Self {
            threads: read_env_or_default(THREADS_ENV_KEY, default_threads, parse_number),
            timeout_ms: read_env_or_default(TIMEOUT_MS_ENV_KEY, default_timeout_ms, parse_positive),
            cases: read_env_or_default(CASES_ENV_KEY, default_cases, parse_positive),
        }
    }

    /// Worker threads per runner; `0` selects hardware concurrency.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Per-check timeout in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Cases per property.
    #[must_use]
    pub fn cases(&self) -> u32 {
        self.cases
    }

    /// Runner settings with the profile's threads and default timeout.
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default()
            .with_num_threads(self.threads)
            .with_default_timeout(Duration::from_millis(self.timeout_ms))
    }

    /// Per-property settings with the profile's case count and timeout.
    #[must_use]
    pub fn exec_config(&self) -> TestExecutionConfig {
        TestExecutionConfig::default()
            .with_max_test_count(self.cases)
            .with_timeout_ms(self.timeout_ms)
    }
}

fn read_env_or_default<T, F>(key: &'static str, default: T, parser: F) -> T
where
    F: Fn(&str) -> Result<T, String>,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    parser(&raw).unwrap_or_else(|reason| {
        tracing::warn!(
            env = key,
            raw = %raw,
            reason = %reason,
            "ignoring invalid run profile override"
        );
        default
    })
}

fn parse_number<T>(raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| format!("parse error: {error}"))
}

fn parse_positive<T>(raw: &str) -> Result<T, String>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_number::<T>(raw)?;
    if value == T::default() {
        return Err("value must be greater than zero".to_owned());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = env::var(key).ok();
            // SAFETY: tests serialize environment access with ENV_LOCK.
            unsafe {
                match value {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
            Self { key, original }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            // SAFETY: tests serialize environment access with ENV_LOCK.
            unsafe {
                match &self.original {
                    Some(value) => env::set_var(self.key, value),
                    None => env::remove_var(self.key),
                }
            }
        }
    }

    fn load_with(threads: Option<&str>, timeout: Option<&str>, cases: Option<&str>) -> RunProfile {
        let _lock = ENV_LOCK.lock().expect("env lock");
        let _threads = EnvGuard::set(THREADS_ENV_KEY, threads);
        let _timeout = EnvGuard::set(TIMEOUT_MS_ENV_KEY, timeout);
        let _cases = EnvGuard::set(CASES_ENV_KEY, cases);
        RunProfile::load(2, 500, 32)
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let profile = load_with(None, None, None);
        assert_eq!((profile.threads(), profile.timeout_ms(), profile.cases()), (2, 500, 32));
    }

    #[test]
    fn overrides_are_applied() {
        let profile = load_with(Some("0"), Some(" 1500 "), Some("8"));
        assert_eq!((profile.threads(), profile.timeout_ms(), profile.cases()), (0, 1500, 8));
        assert_eq!(profile.exec_config().timeout_ms(), 1500);
        assert_eq!(
            profile.runner_config().default_timeout(),
            Duration::from_millis(1500)
        );
    }

    #[rstest]
    #[case(Some("-1"), Some("0"), Some("many"))]
    #[case(Some("lots"), Some("abc"), Some("0"))]
    fn invalid_overrides_fall_back(
        #[case] threads: Option<&str>,
        #[case] timeout: Option<&str>,
        #[case] cases: Option<&str>,
    ) {
        let profile = load_with(threads, timeout, cases);
        assert_eq!((profile.threads(), profile.timeout_ms(), profile.cases()), (2, 500, 32));
    }
}
