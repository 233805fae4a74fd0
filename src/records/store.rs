use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::error::StoreError;

use super::Institution;

/// Document store keyed by symbol. Writes are upserts, so repeated runs are last-write-wins.
#[async_trait]
pub trait InstitutionStore: Send + Sync {
    async fn upsert_all(&self, institutions: &[Institution]) -> Result<usize, StoreError>;

    async fn find_all(&self) -> Result<Vec<Institution>, StoreError>;

    async fn find_by_symbols(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Institution>, StoreError> {
        let mut found: HashMap<String, Institution> = self
            .find_all()
            .await?
            .into_iter()
            .map(|institution| (institution.symbol.clone(), institution))
            .collect();
        found.retain(|symbol, _| symbols.contains(symbol));
        Ok(found)
    }
}

/// In-process store used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Institution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_institutions(institutions: Vec<Institution>) -> Self {
        let documents = institutions
            .into_iter()
            .map(|institution| (institution.symbol.clone(), institution))
            .collect();
        Self {
            documents: Mutex::new(documents),
        }
    }
}

#[async_trait]
impl InstitutionStore for MemoryStore {
    async fn upsert_all(&self, institutions: &[Institution]) -> Result<usize, StoreError> {
        let mut documents = self.documents.lock().await;
        for institution in institutions {
            documents.insert(institution.symbol.clone(), institution.clone());
        }
        Ok(institutions.len())
    }

    async fn find_all(&self) -> Result<Vec<Institution>, StoreError> {
        Ok(self.documents.lock().await.values().cloned().collect())
    }
}

/// Single JSON document on disk mapping symbol to institution.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_documents(&self) -> Result<BTreeMap<String, Institution>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn write_documents(&self, documents: &BTreeMap<String, Institution>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }

        // Replace atomically so a crash mid-write never leaves a truncated document.
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(documents)?;
        fs::write(&tmp, payload).map_err(|err| self.io_error(err))?;
        fs::rename(&tmp, &self.path).map_err(|err| self.io_error(err))?;
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl InstitutionStore for JsonFileStore {
    async fn upsert_all(&self, institutions: &[Institution]) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut documents = self.read_documents()?;
        for institution in institutions {
            documents.insert(institution.symbol.clone(), institution.clone());
        }
        self.write_documents(&documents)?;
        debug!(
            "Persisted {} institutions to {}",
            institutions.len(),
            self.path.display()
        );
        Ok(institutions.len())
    }

    async fn find_all(&self) -> Result<Vec<Institution>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_documents()?.into_values().collect())
    }
}
