use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::utils::{load, remove_file, save};
use crate::{Error, SerializedType};

/// An ordered key/value file. Every change is written through to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registry {
    path: PathBuf,
    entries: IndexMap<String, String>,
}

impl Registry {
    /// Create an empty registry at `path`. Fails if the file exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(Error::RegistryExists(path));
        }
        let registry = Self {
            path,
            entries: IndexMap::new(),
        };
        registry.flush()?;
        Ok(registry)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let entries: Option<IndexMap<String, String>> =
            load(&path, SerializedType::Yaml)?;
        Ok(Self {
            path,
            entries: entries.unwrap_or_default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    /// Like `get` but a missing key is an error
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get(key).ok_or_else(|| Error::MissingKey {
            path: self.path.clone(),
            key: String::from(key),
        })
    }

    /// Parse the value of `key`
    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<T, Error> {
        let value = self.require(key)?;
        value.parse().map_err(|_| Error::InvalidEntry {
            key: String::from(key),
            value: String::from(value),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set `key` to `value` and flush
    pub fn append<S: ToString>(
        &mut self,
        key: &str,
        value: S,
    ) -> Result<(), Error> {
        self.entries.insert(String::from(key), value.to_string());
        self.flush()
    }

    /// Remove `key`, keeping the order of the remaining entries. Does not
    /// flush.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn flush(&self) -> Result<(), Error> {
        save(&self.entries, &self.path, SerializedType::Yaml)
    }

    /// Delete the registry file. Fails with `StrayEntries` if entries
    /// remain, after the file is gone.
    pub fn delete(self) -> Result<(), Error> {
        remove_file(&self.path)?;
        if self.entries.is_empty() {
            Ok(())
        } else {
            Err(Error::StrayEntries(
                self.entries.into_keys().collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_persist_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reg.yaml");
        let mut reg = Registry::create(&path).unwrap();
        reg.append("zeta", 3).unwrap();
        reg.append("alpha", "a.yaml").unwrap();

        let reg = Registry::open(&path).unwrap();
        let keys: Vec<&str> = reg.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(reg.parse::<usize>("zeta").unwrap(), 3);
        assert!(matches!(
            reg.parse::<usize>("alpha"),
            Err(Error::InvalidEntry { .. })
        ));
        assert!(matches!(reg.require("beta"), Err(Error::MissingKey { .. })));
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reg.yaml");
        Registry::create(&path).unwrap();
        assert!(matches!(
            Registry::create(&path),
            Err(Error::RegistryExists(_))
        ));
    }

    #[test]
    fn empty_registry_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reg.yaml");
        Registry::create(&path).unwrap();
        assert!(Registry::open(&path).unwrap().is_empty());
    }

    #[test]
    fn delete_reports_stray_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reg.yaml");
        let mut reg = Registry::create(&path).unwrap();
        reg.append("left", "over").unwrap();
        match reg.delete() {
            Err(Error::StrayEntries(keys)) => assert_eq!(keys, vec!["left"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!path.exists());
    }
}
