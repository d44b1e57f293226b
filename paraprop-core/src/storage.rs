//! Seam for counterexample persistence.
//!
//! The core never chooses a storage or compression format. It forwards
//! failing counterexamples to a [`CounterexampleStore`] and asks the store to
//! restore them for replay.

use tracing::{debug, instrument};

use crate::{
    error::{ParapropError, Result},
    result::TestResult,
};

/// External persistence collaborator.
pub trait CounterexampleStore {
    /// Store-defined record, possibly compressed.
    type Record;
    /// Store-defined failure.
    type Error: std::error::Error;

    /// Persists one counterexample.
    ///
    /// # Errors
    /// Returns the store's error when the write fails.
    fn store(
        &self,
        test_name: &str,
        property_name: &str,
        counterexample: &str,
        message: &str,
    ) -> core::result::Result<(), Self::Error>;

    /// Fetches the newest record for `test_name`.
    ///
    /// # Errors
    /// Returns the store's error when the lookup fails.
    fn get_latest(
        &self,
        test_name: &str,
    ) -> core::result::Result<Option<Self::Record>, Self::Error>;

    /// Restores the counterexample text held by `record`.
    ///
    /// # Errors
    /// Returns the store's error when the record cannot be decoded.
    fn decompress(&self, record: &Self::Record) -> core::result::Result<String, Self::Error>;
}

/// Plain record that simple stores can use as their
/// [`CounterexampleStore::Record`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCounterexample {
    /// Task name the counterexample belongs to.
    pub test_name: String,
    /// Property that produced it.
    pub property_name: String,
    /// Stored form of the counterexample.
    pub payload: String,
    /// Failure message at the time of the run.
    pub message: String,
}

/// Stores the counterexample of every failed result that carries one.
///
/// Returns how many records were written.
///
/// # Errors
/// Returns [`ParapropError::Store`] on the first store failure; records
/// written before it stay written.
#[instrument(name = "storage.persist", skip(results, store), fields(results = results.len()))]
pub fn persist_counterexamples<S>(
    results: &[TestResult],
    property_name: &str,
    store: &S,
) -> Result<usize>
where
    S: CounterexampleStore + ?Sized,
{
    let mut stored = 0;
    for result in results.iter().filter(|result| !result.success()) {
        let Some(counterexample) = result.counterexample() else {
            continue;
        };
        store
            .store(
                result.test_name(),
                property_name,
                counterexample,
                result.error_message(),
            )
            .map_err(store_error)?;
        stored += 1;
    }
    debug!(stored, "persisted counterexamples");
    Ok(stored)
}

/// Returns the newest stored counterexample for `test_name`, decompressed.
///
/// # Errors
/// Returns [`ParapropError::Store`] when lookup or decompression fails.
pub fn replay_latest<S>(store: &S, test_name: &str) -> Result<Option<String>>
where
    S: CounterexampleStore + ?Sized,
{
    store
        .get_latest(test_name)
        .map_err(store_error)?
        .map(|record| store.decompress(&record).map_err(store_error))
        .transpose()
}

fn store_error(error: impl std::error::Error) -> ParapropError {
    ParapropError::Store {
        message: error.to_string(),
    }
}
