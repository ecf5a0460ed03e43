//! Shared experiment-flag store
//!
//! Flags are held as the comma-separated string the host configures
//! (`"experiment-A,experiment-B"`). Readers parse it on every call so that a
//! change is visible to the next request that is sent.

use std::sync::{Arc, RwLock};

/// Cheaply cloneable handle to the experiment flags of a runtime
#[derive(Debug, Clone, Default)]
pub struct ExperimentStore {
    raw: Arc<RwLock<String>>,
}

impl ExperimentStore {
    pub fn new(experiments: impl Into<String>) -> Self {
        Self {
            raw: Arc::new(RwLock::new(experiments.into())),
        }
    }

    /// Replace the experiments string for every handle sharing this store
    pub fn set(&self, experiments: impl Into<String>) {
        let experiments = experiments.into();
        tracing::debug!(experiments = %experiments, "Experiments updated");
        match self.raw.write() {
            Ok(mut raw) => *raw = experiments,
            Err(poisoned) => *poisoned.into_inner() = experiments,
        }
    }

    /// Names of all experiments currently on, in configured order
    pub fn enabled(&self) -> Vec<String> {
        let raw = match self.raw.read() {
            Ok(raw) => raw.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        parse_experiments(&raw)
    }
}

fn parse_experiments(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store() {
        let store = ExperimentStore::default();
        assert!(store.enabled().is_empty());

        store.set("");
        assert!(store.enabled().is_empty());
    }

    #[test]
    fn test_parse_experiments() {
        assert_eq!(parse_experiments("A,B"), vec!["A", "B"]);
        assert_eq!(parse_experiments(" A , ,B,A "), vec!["A", "B"]);
    }

    #[test]
    fn test_clones_share_state() {
        let store = ExperimentStore::new("E1");
        let handle = store.clone();
        store.set("E1,E2");

        assert_eq!(handle.enabled(), vec!["E1", "E2"]);
    }
}
