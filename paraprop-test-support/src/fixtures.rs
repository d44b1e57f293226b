//! Deterministic telemetry, canned properties, and an in-memory store.

use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use paraprop_core::{
    CheckContext, CounterexampleStore, FnProperty, MetricsCollector, Property, PropertyFailure,
    ResourceMetrics, StoredCounterexample,
};

/// Collector replaying scripted `(cpu, memory)` fractions, then repeating
/// the last one.
///
/// # Examples
/// ```
/// use paraprop_core::MetricsCollector;
/// use paraprop_test_support::fixtures::ScriptedCollector;
///
/// let collector = ScriptedCollector::new([(0.9, 0.1), (0.2, 0.1)]);
/// assert_eq!(collector.collect_one_sample().cpu_usage_percent, 0.9);
/// assert_eq!(collector.collect_one_sample().cpu_usage_percent, 0.2);
/// assert_eq!(collector.collect_one_sample().cpu_usage_percent, 0.2);
/// assert_eq!(collector.samples_taken(), 3);
/// ```
#[derive(Debug)]
pub struct ScriptedCollector {
    script: Mutex<VecDeque<(f64, f64)>>,
    last: Mutex<(f64, f64)>,
    taken: AtomicUsize,
}

impl ScriptedCollector {
    /// Creates a collector replaying `script`; an empty script reports zeros.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new((0.0, 0.0)),
            taken: AtomicUsize::new(0),
        }
    }

    /// Number of samples handed out so far.
    #[must_use]
    pub fn samples_taken(&self) -> usize {
        self.taken.load(Ordering::SeqCst)
    }
}

impl MetricsCollector for ScriptedCollector {
    fn collect_one_sample(&self) -> ResourceMetrics {
        self.taken.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            *last = next;
        }
        ResourceMetrics::now(last.0, last.1)
    }
}

/// Property that always passes.
#[must_use]
pub fn passing_property(name: &str) -> Arc<dyn Property> {
    Arc::new(FnProperty::new(name, |_: &CheckContext| Ok(())))
}

/// Property that sleeps for `delay` and then passes, ignoring cancellation.
#[must_use]
pub fn sleeping_property(name: &str, delay: Duration) -> Arc<dyn Property> {
    Arc::new(FnProperty::new(name, move |_: &CheckContext| {
        thread::sleep(delay);
        Ok(())
    }))
}

/// Property that fails with `counterexample`.
#[must_use]
pub fn failing_property(name: &str, counterexample: &str) -> Arc<dyn Property> {
    let counterexample = counterexample.to_owned();
    Arc::new(FnProperty::new(name, move |_: &CheckContext| {
        Err(PropertyFailure::new("property violated").with_counterexample(counterexample.clone()))
    }))
}

/// Property whose body panics with `message`.
#[must_use]
pub fn panicking_property(name: &str, message: &'static str) -> Arc<dyn Property> {
    Arc::new(FnProperty::new(name, move |_: &CheckContext| -> Result<(), PropertyFailure> {
        panic!("{message}")
    }))
}

/// Store keeping records in memory, with no compression.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoredCounterexample>>,
}

impl MemoryStore {
    /// Every stored record, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<StoredCounterexample> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CounterexampleStore for MemoryStore {
    type Record = StoredCounterexample;
    type Error = Infallible;

    fn store(
        &self,
        test_name: &str,
        property_name: &str,
        counterexample: &str,
        message: &str,
    ) -> Result<(), Infallible> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredCounterexample {
                test_name: test_name.to_owned(),
                property_name: property_name.to_owned(),
                payload: counterexample.to_owned(),
                message: message.to_owned(),
            });
        Ok(())
    }

    fn get_latest(&self, test_name: &str) -> Result<Option<StoredCounterexample>, Infallible> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|record| record.test_name == test_name)
            .cloned())
    }

    fn decompress(&self, record: &StoredCounterexample) -> Result<String, Infallible> {
        Ok(record.payload.clone())
    }
}
