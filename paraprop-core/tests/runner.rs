//! End-to-end behaviour of `ParallelTestRunner`.

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use common::{plain_runner, profile, profiled_runner, scripted_runner};
use paraprop_core::{
    CheckContext, FailureKind, FnProperty, ParallelTestRunner, RunnerConfig, StrategyProperty,
    TestExecutionConfig,
};
use paraprop_test_support::fixtures::{
    ScriptedCollector, failing_property, panicking_property, passing_property, sleeping_property,
};
use proptest::prop_assert_eq;
use rstest::{fixture, rstest};

#[fixture]
fn runner() -> ParallelTestRunner {
    plain_runner(4)
}

#[rstest]
fn every_task_yields_one_result_in_order(runner: ParallelTestRunner) {
    for index in 0..25 {
        let property = if index % 5 == 0 {
            failing_property("odd one out", &index.to_string())
        } else {
            passing_property("fine")
        };
        runner.add_property(format!("case-{index}"), property, TestExecutionConfig::default());
    }
    let results = runner.run_all().expect("runner is live");

    assert_eq!(results.len(), 25);
    for (index, result) in results.iter().enumerate() {
        assert_eq!(result.test_name(), format!("case-{index}"));
        assert_eq!(result.success(), index % 5 != 0);
    }
    assert_eq!(results[10].counterexample(), Some("10"));
    assert_eq!(results[10].error_message(), "property violated");
}

#[rstest]
fn slow_check_times_out_without_holding_the_batch(runner: ParallelTestRunner) {
    runner.add_property(
        "slow",
        sleeping_property("slow", Duration::from_millis(500)),
        TestExecutionConfig::default().with_timeout_ms(50),
    );
    runner.add_property("quick", passing_property("quick"), TestExecutionConfig::default());

    let started = Instant::now();
    let results = runner.run_all().expect("runner is live");
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(450), "took {elapsed:?}");
    assert_eq!(results[0].kind(), FailureKind::Timeout);
    assert_eq!(results[0].duration(), Duration::from_millis(50));
    assert!(results[1].success());
}

#[test]
fn zero_timeout_falls_back_to_runner_default() {
    let runner = ParallelTestRunner::new(
        RunnerConfig::default()
            .with_num_threads(1)
            .with_adaptive_scheduling(false)
            .with_default_timeout(Duration::from_millis(30)),
    )
    .expect("configuration is valid");
    runner.add_property(
        "slow",
        sleeping_property("slow", Duration::from_millis(400)),
        TestExecutionConfig::default().with_timeout_ms(0),
    );
    let result = runner.run_all().expect("runner is live").remove(0);
    assert_eq!(result.kind(), FailureKind::Timeout);
    assert_eq!(result.duration(), Duration::from_millis(30));
}

#[rstest]
fn panics_become_runtime_errors(runner: ParallelTestRunner) {
    runner.add_property(
        "explodes",
        panicking_property("explodes", "division by zero"),
        TestExecutionConfig::default(),
    );
    runner.add_property("after", passing_property("after"), TestExecutionConfig::default());
    let results = runner.run_all().expect("runner is live");

    assert_eq!(results[0].kind(), FailureKind::RuntimeError);
    assert!(results[0].error_message().contains("division by zero"));
    assert!(results[1].success());
}

#[rstest]
fn checks_run_concurrently(runner: ParallelTestRunner) {
    for index in 0..4 {
        runner.add_property(
            format!("sleep-{index}"),
            sleeping_property("sleep", Duration::from_millis(100)),
            TestExecutionConfig::default(),
        );
    }
    let started = Instant::now();
    let results = runner.run_all().expect("runner is live");
    assert!(results.iter().all(|result| result.success()));
    assert!(started.elapsed() < Duration::from_millis(350));
}

#[test]
fn zero_threads_selects_hardware_concurrency() {
    let runner = plain_runner(0);
    let expected = thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    assert_eq!(runner.effective_threads(), expected);
}

#[test]
fn empty_batch_returns_no_results() {
    let runner = plain_runner(2);
    assert!(runner.run_all().expect("runner is live").is_empty());
}

#[test]
fn results_accumulate_across_batches() {
    let runner = plain_runner(2);
    runner.add_property("first", passing_property("first"), TestExecutionConfig::default());
    assert_eq!(runner.run_all().expect("runner is live").len(), 1);
    runner.add_property("second", passing_property("second"), TestExecutionConfig::default());
    let second = runner.run_all().expect("runner is live");
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].test_name(), "second");
}

#[test]
fn calm_telemetry_admits_immediately() {
    let collector = Arc::new(ScriptedCollector::new([(0.1, 0.1)]));
    let runner = scripted_runner(
        RunnerConfig::default()
            .with_num_threads(2)
            .with_sampling_interval(Duration::from_millis(5))
            .with_max_admission_wait(Duration::from_secs(5)),
        collector.clone(),
    );
    for index in 0..6 {
        runner.add_property(
            format!("calm-{index}"),
            passing_property("calm"),
            TestExecutionConfig::default(),
        );
    }
    let started = Instant::now();
    let results = runner.run_all().expect("runner is live");
    assert_eq!(results.len(), 6);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(collector.samples_taken() >= 1);
}

#[test]
fn pressure_that_clears_releases_admission() {
    let collector = Arc::new(ScriptedCollector::new([(0.99, 0.1), (0.99, 0.1), (0.2, 0.1)]));
    let runner = scripted_runner(
        RunnerConfig::default()
            .with_num_threads(1)
            .with_sampling_interval(Duration::from_millis(10))
            .with_admission_poll(Duration::from_millis(5))
            .with_max_admission_wait(Duration::from_secs(10)),
        collector,
    );
    runner.add_property("gated", passing_property("gated"), TestExecutionConfig::default());
    let started = Instant::now();
    let results = runner.run_all().expect("runner is live");
    assert!(results[0].success());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn concurrency_cap_serializes_checks_on_a_wide_pool() {
    let runner = scripted_runner(
        RunnerConfig::default()
            .with_num_threads(4)
            .with_max_concurrent_tests(1)
            .with_sampling_interval(Duration::from_millis(5))
            .with_admission_poll(Duration::from_millis(2))
            .with_max_admission_wait(Duration::from_secs(10)),
        Arc::new(ScriptedCollector::new([(0.1, 0.1)])),
    );
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    for index in 0..6 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        runner.add_property(
            format!("capped-{index}"),
            FnProperty::new("capped", move |_: &CheckContext| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }),
            TestExecutionConfig::default(),
        );
    }

    let results = runner.run_all().expect("runner is live");
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|result| result.success()));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn strategy_properties_run_the_profiled_case_count() {
    let profile = profile();
    let runner = profiled_runner();
    let cases_run = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cases_run);
    runner.add_property(
        "addition commutes",
        StrategyProperty::new("addition commutes", (0u32..1_000, 0u32..1_000), move |(a, b)| {
            counter.fetch_add(1, Ordering::SeqCst);
            prop_assert_eq!(a + b, b + a);
            Ok(())
        }),
        profile.exec_config(),
    );

    let results = runner.run_all().expect("runner is live");
    assert!(results[0].success(), "{}", results[0].error_message());
    let expected = usize::try_from(profile.cases()).expect("case count fits usize");
    assert_eq!(cases_run.load(Ordering::SeqCst), expected);
}
