use std::collections::HashMap;

use anyhow::{bail, Result};

use super::KeyValueStore;

/// In-process store for tests and throwaway sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Number of `set_many`/`remove` calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Makes every later write fail, like a browser store over quota.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_many(&mut self, entries: &[(&str, &str)]) -> Result<()> {
        if self.fail_writes {
            bail!("memory store rejected write");
        }
        self.writes += 1;
        for (key, value) in entries {
            self.entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.fail_writes {
            bail!("memory store rejected write");
        }
        self.writes += 1;
        self.entries.remove(key);
        Ok(())
    }
}
