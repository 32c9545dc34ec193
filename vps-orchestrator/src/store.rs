//! Named JSON document persistence.
//!
//! The inventory store, credential issuer, admin set, and operation log all
//! persist through [`DocumentStore`]; nothing else touches raw documents.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::error::{FleetError, Result};

/// Directory permissions for the data directory
const DIR_PERMISSIONS: u32 = 0o700;

pub trait DocumentStore: Send + Sync {
    /// Read a document; `None` when it was never written.
    fn read_document(&self, name: &str) -> Result<Option<Value>>;

    /// Replace a document atomically.
    fn write_document(&self, name: &str, value: &Value) -> Result<()>;

    /// Names of all documents starting with `prefix`, sorted.
    fn list_documents(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and deserialize a document, falling back to `T::default()` when absent.
pub fn load<T>(store: &dyn DocumentStore, name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match store.read_document(name)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

/// Serialize and write a document.
pub fn save<T: Serialize>(store: &dyn DocumentStore, name: &str, document: &T) -> Result<()> {
    let value = serde_json::to_value(document)?;
    store.write_document(name, &value)
}

fn validate_document_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(FleetError::Storage(format!(
            "Invalid document name: {:?}",
            name
        )));
    }
    Ok(())
}

/// One pretty-printed `<name>.json` file per document in a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a data directory.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&data_dir, fs::Permissions::from_mode(DIR_PERMISSIONS))?;
            }
        }
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_document_name(name)?;
        Ok(self.data_dir.join(format!("{}.json", name)))
    }
}

impl DocumentStore for JsonFileStore {
    #[instrument(skip(self))]
    fn read_document(&self, name: &str) -> Result<Option<Value>> {
        let path = self.path_for(name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(FleetError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            FleetError::Storage(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    #[instrument(skip(self, value))]
    fn write_document(&self, name: &str, value: &Value) -> Result<()> {
        let path = self.path_for(name)?;
        let content = serde_json::to_vec_pretty(value)?;

        // Write to a sibling temp file and rename so readers never see a partial document
        let mut tmp = tempfile::NamedTempFile::new_in(&self.data_dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| {
            FleetError::Storage(format!("Failed to write {}: {}", path.display(), e.error))
        })?;

        Ok(())
    }

    fn list_documents(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(".json") {
                if name.starts_with(prefix) && validate_document_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Process-local store for tests and ephemeral deployments.
///
/// Writes and reads can be made to fail per document-name prefix to exercise
/// storage error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    failing_writes: Mutex<Vec<String>>,
    failing_reads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write to a document whose name starts with `prefix` ("" = all).
    pub fn fail_writes_with_prefix(&self, prefix: &str) {
        lock(&self.failing_writes).push(prefix.to_string());
    }

    /// Fail every read of a document whose name starts with `prefix` ("" = all).
    pub fn fail_reads_with_prefix(&self, prefix: &str) {
        lock(&self.failing_reads).push(prefix.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_writes).clear();
        lock(&self.failing_reads).clear();
    }

    fn should_fail(list: &Mutex<Vec<String>>, name: &str) -> bool {
        lock(list).iter().any(|prefix| name.starts_with(prefix.as_str()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl DocumentStore for MemoryStore {
    fn read_document(&self, name: &str) -> Result<Option<Value>> {
        validate_document_name(name)?;
        if Self::should_fail(&self.failing_reads, name) {
            return Err(FleetError::Storage(format!("Simulated read failure: {}", name)));
        }
        Ok(lock(&self.documents).get(name).cloned())
    }

    fn write_document(&self, name: &str, value: &Value) -> Result<()> {
        validate_document_name(name)?;
        if Self::should_fail(&self.failing_writes, name) {
            return Err(FleetError::Storage(format!("Simulated write failure: {}", name)));
        }
        lock(&self.documents).insert(name.to_string(), value.clone());
        Ok(())
    }

    fn list_documents(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = lock(&self.documents)
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
