//! Scoped variable store
//!
//! Holds the merged environment variables and properties visible to a single
//! node at execution time. Layers are merged narrowest-last, so a step value
//! shadows a job value, which shadows a pipeline value, which shadows the
//! process environment. Properties additionally get scope-qualified copies so
//! an outer scope's value stays addressable after shadowing.

use std::collections::BTreeMap;

/// All key variants under which a property is published for a node whose
/// ancestor id chain is `id_chain` (outermost first, owning node last)
///
/// A property `k` declared on a step `s` in job `j` in pipeline `p` is
/// published as `k`, `s.k`, `j.s.k` and `p.j.s.k`.
pub fn scoped_keys(id_chain: &[String], key: &str) -> Vec<String> {
    let mut keys = Vec::with_capacity(id_chain.len() + 1);
    keys.push(key.to_string());
    for start in (0..id_chain.len()).rev() {
        let mut qualified = id_chain[start..].join(".");
        qualified.push('.');
        qualified.push_str(key);
        keys.push(qualified);
    }
    keys
}

/// Merged variables for one node, built fresh per execution
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    env: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        VariableStore::default()
    }

    /// Start from the parent process environment
    pub fn with_process_env() -> Self {
        let mut store = VariableStore::new();
        for (key, value) in std::env::vars() {
            store.env.insert(key, value);
        }
        store
    }

    /// Merge a layer of environment variables, shadowing earlier layers
    pub fn merge_env(&mut self, vars: &BTreeMap<String, String>) {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// Merge a layer of properties declared at the scope identified by
    /// `id_chain`, publishing each value under all of its scoped keys
    pub fn merge_properties(&mut self, id_chain: &[String], props: &BTreeMap<String, String>) {
        for (key, value) in props {
            for scoped in scoped_keys(id_chain, key) {
                self.properties.insert(scoped, value.clone());
            }
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}
