//! Counterexample persistence and replay through an external store.

mod common;

use common::plain_runner;
use paraprop_core::{
    CheckContext, CounterexampleMinimizer, FnProperty, MinimizerConfig, PropertyFailure,
    TestExecutionConfig, persist_counterexamples, replay_latest, shrinkers,
};
use paraprop_test_support::fixtures::{MemoryStore, failing_property, passing_property};

#[test]
fn failed_runs_are_stored_and_replayable() {
    let runner = plain_runner(2);
    runner.add_property("fine", passing_property("fine"), TestExecutionConfig::default());
    runner.add_property(
        "broken",
        failing_property("broken", "[4, 1]"),
        TestExecutionConfig::default(),
    );
    let results = runner.run_all().expect("runner is live");
    let store = MemoryStore::default();

    let stored = persist_counterexamples(&results, "sorting", &store).expect("store accepts");
    assert_eq!(stored, 1);
    let records = store.records();
    assert_eq!(records[0].test_name, "broken");
    assert_eq!(records[0].property_name, "sorting");
    assert_eq!(records[0].message, "property violated");

    assert_eq!(
        replay_latest(&store, "broken").expect("store reads"),
        Some("[4, 1]".to_owned())
    );
    assert_eq!(replay_latest(&store, "fine").expect("store reads"), None);
}

#[test]
fn replay_prefers_the_newest_record() {
    let store = MemoryStore::default();
    for counterexample in ["[9, 9, 9]", "[9]"] {
        let runner = plain_runner(1);
        runner.add_property(
            "shrinking",
            failing_property("shrinking", counterexample),
            TestExecutionConfig::default(),
        );
        let results = runner.run_all().expect("runner is live");
        persist_counterexamples(&results, "shrinking", &store).expect("store accepts");
    }
    assert_eq!(store.records().len(), 2);
    assert_eq!(
        replay_latest(&store, "shrinking").expect("store reads"),
        Some("[9]".to_owned())
    );
}

#[test]
fn minimized_counterexample_round_trips_through_the_store() {
    let minimizer = CounterexampleMinimizer::new(
        |values: &Vec<i32>| values.iter().sum::<i32>() < 10,
        shrinkers::sequence,
    );
    let minimal = minimizer
        .minimize(vec![3, 8, 1, 6, 2], &MinimizerConfig::default())
        .minimal_value;
    assert!(minimal.iter().sum::<i32>() >= 10);

    let runner = plain_runner(1);
    let rendered = format!("{minimal:?}");
    let counterexample = rendered.clone();
    runner.add_property(
        "sum_below_ten",
        FnProperty::new("sum_below_ten", move |_: &CheckContext| {
            Err(PropertyFailure::new("sum too large").with_counterexample(counterexample.clone()))
        }),
        TestExecutionConfig::default(),
    );
    let results = runner.run_all().expect("runner is live");
    let store = MemoryStore::default();
    persist_counterexamples(&results, "sum_below_ten", &store).expect("store accepts");
    assert_eq!(
        replay_latest(&store, "sum_below_ten").expect("store reads"),
        Some(rendered)
    );
}
