//! Distribution of registrations across several runners.

mod common;

use std::{sync::Arc, time::Duration};

use common::plain_runner;
use paraprop_core::{
    DistributionStrategy, FailureKind, ParallelTestRunner, ParapropError, TestDistributor,
    TestExecutionConfig,
};
use paraprop_test_support::fixtures::{failing_property, passing_property, sleeping_property};
use rstest::rstest;

fn distributor(count: usize, strategy: DistributionStrategy) -> TestDistributor {
    let runners = (0..count).map(|_| plain_runner(2)).collect();
    TestDistributor::new(runners, strategy).expect("runners are present")
}

#[test]
fn round_robin_spreads_thirty_tasks_evenly() {
    let distributor = distributor(3, DistributionStrategy::RoundRobin);
    for index in 0..30 {
        distributor
            .add_property(
                format!("task-{index}"),
                passing_property("ok"),
                TestExecutionConfig::default(),
            )
            .expect("round robin always selects");
    }
    let pending: Vec<usize> = distributor
        .runners()
        .iter()
        .map(ParallelTestRunner::get_pending_tests)
        .collect();
    assert_eq!(pending, vec![10, 10, 10]);

    let results = distributor.run_all().expect("runners are live");
    assert_eq!(results.len(), 3);
    let names: Vec<&str> = results[1].iter().map(|result| result.test_name()).collect();
    let expected: Vec<String> = (0..10).map(|step| format!("task-{}", step * 3 + 1)).collect();
    assert_eq!(names, expected);
}

#[test]
fn load_balanced_targets_the_least_loaded_runner() {
    let distributor = distributor(3, DistributionStrategy::LoadBalanced);
    let preload = [5, 2, 8];
    for (runner, count) in distributor.runners().iter().zip(preload) {
        for index in 0..count {
            runner.add_property(
                format!("preloaded-{index}"),
                passing_property("ok"),
                TestExecutionConfig::default(),
            );
        }
    }
    let chosen = distributor
        .add_property("new", passing_property("ok"), TestExecutionConfig::default())
        .expect("load balancing always selects");
    assert_eq!(chosen, 1);
    assert_eq!(distributor.runners()[1].get_pending_tests(), 3);
}

#[test]
fn runners_execute_concurrently() {
    let distributor = distributor(3, DistributionStrategy::RoundRobin);
    for index in 0..3 {
        distributor
            .add_property(
                format!("sleep-{index}"),
                sleeping_property("sleep", Duration::from_millis(150)),
                TestExecutionConfig::default(),
            )
            .expect("round robin always selects");
    }
    let started = std::time::Instant::now();
    let results = distributor.run_all().expect("runners are live");
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(results.iter().flatten().all(|result| result.success()));
}

#[test]
fn failures_stay_with_their_runner() {
    let distributor = distributor(2, DistributionStrategy::RoundRobin);
    distributor
        .add_property("fine", passing_property("fine"), TestExecutionConfig::default())
        .expect("round robin always selects");
    distributor
        .add_property(
            "broken",
            failing_property("broken", "[7]"),
            TestExecutionConfig::default(),
        )
        .expect("round robin always selects");
    let results = distributor.run_all().expect("runners are live");
    assert!(results[0][0].success());
    assert_eq!(results[1][0].kind(), FailureKind::PropertyFailure);
    assert_eq!(results[1][0].counterexample(), Some("[7]"));
}

#[rstest]
#[case::first(0)]
#[case::last(2)]
fn affinity_selector_pins_by_name(#[case] pinned: usize) {
    let distributor = distributor(
        3,
        DistributionStrategy::AffinityBased(Some(Arc::new(
            move |name: &str, _runners: &[ParallelTestRunner]| {
                if name.starts_with("db-") { pinned } else { 1 }
            },
        ))),
    );
    let db = distributor
        .add_property("db-migrations", passing_property("db"), TestExecutionConfig::default())
        .expect("selector is in range");
    let other = distributor
        .add_property("parser", passing_property("parser"), TestExecutionConfig::default())
        .expect("selector is in range");
    assert_eq!((db, other), (pinned, 1));
}

#[test]
fn stopped_distributor_refuses_to_run() {
    let distributor = distributor(2, DistributionStrategy::RoundRobin);
    distributor
        .add_property("late", passing_property("late"), TestExecutionConfig::default())
        .expect("round robin always selects");
    distributor.stop();
    assert_eq!(
        distributor.run_all().expect_err("runners are stopped"),
        ParapropError::PoolShutDown
    );
}
