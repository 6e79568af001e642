//! Shared accumulation of worker results.

use std::sync::{Arc, Mutex, PoisonError};

use crate::worker::WorkResult;

/// Append-only container of the [`WorkResult`]s of a run.
///
/// Cloning the collector yields another handle to the same storage, and appending is safe from any
/// number of tasks. Consumers must treat a snapshot as an unordered multiset.
#[derive(Clone, Debug, Default)]
pub struct ResultCollector {
    results: Arc<Mutex<Vec<WorkResult>>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a result.
    pub fn append(&self, result: WorkResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    /// Returns a copy of all results collected so far.
    pub fn snapshot(&self) -> Vec<WorkResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
