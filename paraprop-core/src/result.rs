//! Result records produced by a run.
//!
//! Reporting collaborators rely on the field set of [`TestResult`]
//! (`test_name`, `success`, `duration`, `error_message`, `counterexample`);
//! keep it stable.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::property::PropertyFailure;

/// Message recorded for checks that exceed their timeout.
pub(crate) const TIMEOUT_MESSAGE: &str = "Test timeout exceeded";

/// Classifies how a check finished.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
pub enum FailureKind {
    /// The check passed.
    Passed,
    /// The property reported a violation.
    PropertyFailure,
    /// The check exceeded its timeout and was detached.
    Timeout,
    /// The check body failed for reasons unrelated to the property (panic).
    RuntimeError,
}

/// Outcome of one submitted task. Produced exactly once per task.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use paraprop_core::{FailureKind, TestResult};
///
/// let result = TestResult::timed_out("slow", Duration::from_millis(50));
/// assert!(!result.success());
/// assert_eq!(result.kind(), FailureKind::Timeout);
/// assert_eq!(result.duration(), Duration::from_millis(50));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TestResult {
    test_name: String,
    success: bool,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "duration_ms", serialize_with = "serialize_millis")
    )]
    duration: Duration,
    error_message: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    counterexample: Option<String>,
    kind: FailureKind,
}

impl TestResult {
    /// Records a passing check.
    #[must_use]
    pub fn passed(test_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            test_name: test_name.into(),
            success: true,
            duration,
            error_message: String::new(),
            counterexample: None,
            kind: FailureKind::Passed,
        }
    }

    /// Records a property violation, keeping its counterexample.
    #[must_use]
    pub fn property_failure(
        test_name: impl Into<String>,
        duration: Duration,
        failure: PropertyFailure,
    ) -> Self {
        let (error_message, counterexample) = failure.into_parts();
        Self {
            test_name: test_name.into(),
            success: false,
            duration,
            error_message,
            counterexample,
            kind: FailureKind::PropertyFailure,
        }
    }

    /// Records a check that exceeded `timeout`; the duration is the timeout.
    #[must_use]
    pub fn timed_out(test_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            test_name: test_name.into(),
            success: false,
            duration: timeout,
            error_message: TIMEOUT_MESSAGE.to_owned(),
            counterexample: None,
            kind: FailureKind::Timeout,
        }
    }

    /// Records an unexpected failure unrelated to property semantics.
    #[must_use]
    pub fn runtime_error(
        test_name: impl Into<String>,
        duration: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            success: false,
            duration,
            error_message: message.into(),
            counterexample: None,
            kind: FailureKind::RuntimeError,
        }
    }

    /// Returns the registered task name.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Returns whether the check passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// Returns the wall-clock time attributed to the check.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the failure message; empty for passing checks.
    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Returns the serialized counterexample of a property failure.
    #[must_use]
    pub fn counterexample(&self) -> Option<&str> {
        self.counterexample.as_deref()
    }

    /// Returns how the check finished.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

/// Named collection of results from one run, in submission order.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use paraprop_core::{TestResult, TestSuite};
///
/// let suite = TestSuite::new(
///     "parser",
///     vec![
///         TestResult::passed("a", Duration::from_millis(3)),
///         TestResult::runtime_error("b", Duration::from_millis(1), "panicked"),
///     ],
///     Duration::from_millis(4),
/// );
/// assert_eq!(suite.passed(), 1);
/// assert_eq!(suite.failed(), 1);
/// assert!(!suite.all_passed());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TestSuite {
    name: String,
    results: Vec<TestResult>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "duration_ms", serialize_with = "serialize_millis")
    )]
    duration: Duration,
}

impl TestSuite {
    /// Bundles `results` under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, results: Vec<TestResult>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            results,
            duration,
        }
    }

    /// Returns the suite name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the results in submission order.
    #[must_use]
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Returns the wall-clock time spent running the suite.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Counts passing results.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|result| result.success()).count()
    }

    /// Counts failing results.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// Returns whether every result passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(TestResult::success)
    }

    /// Consumes the suite, returning its results.
    #[must_use]
    pub fn into_results(self) -> Vec<TestResult> {
        self.results
    }
}

#[cfg(feature = "serde")]
fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_failure_keeps_counterexample() {
        let result = TestResult::property_failure(
            "prop",
            Duration::from_millis(5),
            PropertyFailure::new("broken").with_counterexample("[1, 2]"),
        );
        assert!(!result.success());
        assert_eq!(result.error_message(), "broken");
        assert_eq!(result.counterexample(), Some("[1, 2]"));
        assert_eq!(result.kind(), FailureKind::PropertyFailure);
    }

    #[test]
    fn runtime_errors_have_no_counterexample() {
        let result = TestResult::runtime_error("prop", Duration::ZERO, "panicked");
        assert_eq!(result.counterexample(), None);
        assert_eq!(result.kind(), FailureKind::RuntimeError);
    }

    #[test]
    fn timeout_message_mentions_timeout() {
        let result = TestResult::timed_out("prop", Duration::from_millis(50));
        assert!(result.error_message().contains("timeout"));
    }

    #[test]
    fn empty_suite_passes() {
        let suite = TestSuite::new("empty", Vec::new(), Duration::ZERO);
        assert!(suite.all_passed());
        assert_eq!(suite.failed(), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn results_serialize_with_stable_field_names() {
        let result = TestResult::property_failure(
            "sorting",
            Duration::from_millis(12),
            PropertyFailure::new("out of order").with_counterexample("[2, 1]"),
        );
        let value = serde_json::to_value(&result).expect("serializes");
        assert_eq!(
            value,
            serde_json::json!({
                "test_name": "sorting",
                "success": false,
                "duration_ms": 12,
                "error_message": "out of order",
                "counterexample": "[2, 1]",
                "kind": "property_failure",
            })
        );

        let passed =
            serde_json::to_value(TestResult::passed("ok", Duration::ZERO)).expect("serializes");
        assert!(passed.get("counterexample").is_none());
    }
}
