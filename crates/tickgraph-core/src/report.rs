//! End-of-run counter reporting.
//!
//! Model components register named counters once, up front, then update
//! them cheaply while the scheduler runs. [`Report::snapshot`] hands an
//! external collaborator the final (name, value) pairs; formatting them
//! into JSON/CSV/whatever is entirely the collaborator's problem.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

/// A single named counter. Cheap to increment from inside a handler.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Registry of named counters, reported at the end of a run.
#[derive(Default)]
pub struct Report {
    counters: FxHashMap<String, Counter>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named counter, or return the existing one if already
    /// registered under that name.
    pub fn counter(&mut self, name: impl Into<String>) -> &Counter {
        self.counters.entry(name.into()).or_default()
    }

    /// Look up a previously-registered counter without creating one.
    pub fn get(&self, name: &str) -> Option<&Counter> {
        self.counters.get(name)
    }

    /// The final (name, value) pairs, sorted by name for deterministic
    /// output.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut pairs: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|(name, counter)| (name.clone(), counter.get()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    pub fn reset(&self) {
        for counter in self.counters.values() {
            counter.set(0);
        }
    }
}
