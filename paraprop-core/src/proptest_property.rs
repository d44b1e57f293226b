//! Adaptor running a proptest strategy as a [`Property`].

use std::fmt;

use proptest::{
    strategy::Strategy,
    test_runner::{Config, RngAlgorithm, TestCaseResult, TestError, TestRng, TestRunner},
};

use crate::property::{CheckContext, Property, PropertyFailure};

/// Drives `predicate` over values drawn from `strategy`.
///
/// Case count, shrink budget, and seed come from the [`CheckContext`]'s
/// configuration. A failing case is reported with proptest's minimal input
/// rendered through `{:#?}` as the counterexample. Once the context is
/// cancelled the remaining cases pass without running the predicate.
///
/// # Examples
/// ```
/// use paraprop_core::{CheckContext, Property, StrategyProperty, TestExecutionConfig};
/// use proptest::prop_assert;
///
/// let property = StrategyProperty::new("small", 0u32..100, |value| {
///     prop_assert!(value < 50);
///     Ok(())
/// });
/// let ctx = CheckContext::new(TestExecutionConfig::default().with_seed(7));
/// let failure = property.check(&ctx).expect_err("half the range fails");
/// assert_eq!(failure.counterexample(), Some("50"));
/// ```
pub struct StrategyProperty<S, F> {
    name: String,
    strategy: S,
    predicate: F,
}

impl<S, F> StrategyProperty<S, F>
where
    S: Strategy + Send + Sync,
    F: Fn(S::Value) -> TestCaseResult + Send + Sync,
{
    /// Wraps `strategy` and `predicate` under `name`.
    pub fn new(name: impl Into<String>, strategy: S, predicate: F) -> Self {
        Self {
            name: name.into(),
            strategy,
            predicate,
        }
    }

    fn runner(ctx: &CheckContext) -> TestRunner {
        let exec = ctx.config();
        let config = Config {
            cases: exec.max_test_count(),
            max_shrink_iters: exec.max_shrink_iters(),
            failure_persistence: None,
            ..Config::default()
        };
        match exec.seed() {
            Some(seed) => TestRunner::new_with_rng(config, seeded_rng(seed)),
            None => TestRunner::new(config),
        }
    }
}

impl<S, F> Property for StrategyProperty<S, F>
where
    S: Strategy + Send + Sync,
    F: Fn(S::Value) -> TestCaseResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, ctx: &CheckContext) -> Result<(), PropertyFailure> {
        let mut runner = Self::runner(ctx);
        runner
            .run(&self.strategy, |value| {
                if ctx.is_cancelled() {
                    return Ok(());
                }
                (self.predicate)(value)
            })
            .map_err(|error| match error {
                TestError::Fail(reason, value) => {
                    PropertyFailure::new(format!("{} failed: {reason}", self.name))
                        .with_counterexample(format!("{value:#?}"))
                }
                TestError::Abort(reason) => {
                    PropertyFailure::new(format!("{} aborted: {reason}", self.name))
                }
            })
    }
}

impl<S, F> fmt::Debug for StrategyProperty<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyProperty")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn seeded_rng(seed: u64) -> TestRng {
    let mut bytes = [0_u8; 32];
    let seed_bytes = seed.to_le_bytes();
    if let Some(prefix) = bytes.get_mut(..seed_bytes.len()) {
        prefix.copy_from_slice(&seed_bytes);
    }
    TestRng::from_seed(RngAlgorithm::ChaCha, &bytes)
}
