//! Persistent key/value storage kept in a JSON file in the data directory.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PDF_KEY: &str = "pdf";
pub const REVIEW_ASKED_KEY: &str = "has-review-been-asked";

const STORE_FILE: &str = "storage.json";

#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl Store {
    /// Open the store in `dir`, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {:?}", dir))?;
        let path = dir.join(STORE_FILE);

        let entries: BTreeMap<String, String> = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {:?}", path))?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "Opened store");

        Ok(Self { path, entries })
    }

    /// Default location: `<platform data dir>/attestation`
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("attestation"))
            .ok_or_else(|| anyhow!("Could not determine the data directory, pass --data-dir"))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.get(PDF_KEY), None);
        assert!(!dir.path().join(STORE_FILE).exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.set(PDF_KEY, "JVBERi0=").unwrap();
        store.set(REVIEW_ASKED_KEY, "true").unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.get(PDF_KEY), Some("JVBERi0="));
        assert_eq!(store.get(REVIEW_ASKED_KEY), Some("true"));
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.set(PDF_KEY, "JVBERi0=").unwrap();
        store.remove(PDF_KEY).unwrap();
        store.remove("missing").unwrap();

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.get(PDF_KEY), None);
    }

    #[test]
    fn test_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut store = Store::open(&nested).unwrap();
        store.set("k", "v").unwrap();
        assert!(nested.join(STORE_FILE).exists());
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STORE_FILE), "not json").unwrap();
        assert!(Store::open(dir.path()).is_err());
    }
}
