use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

use crate::domain::CandidateInstrument;
use crate::error::Result;
use crate::market::HoldingsMapping;

/// Repository of the persisted security -> candidate-instrument mapping,
/// keyed by security code.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    async fn get(&self, security: &str) -> Result<Option<Vec<CandidateInstrument>>>;

    async fn has(&self, security: &str) -> Result<bool> {
        Ok(self.get(security).await?.is_some())
    }

    /// All mapped security codes.
    async fn list(&self) -> Result<Vec<String>>;

    async fn save(&self, security: &str, candidates: &[CandidateInstrument]) -> Result<()>;

    /// Replace the whole mapping in one shot (used by the bootstrap path).
    async fn save_all(&self, mapping: &HoldingsMapping) -> Result<()>;

    async fn delete(&self, security: &str) -> Result<bool>;

    async fn load_all(&self) -> Result<HoldingsMapping>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.list().await?.is_empty())
    }
}

/// In-memory mapping store for tests.
pub struct MemoryMappingStore {
    mapping: RwLock<HoldingsMapping>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self {
            mapping: RwLock::new(HoldingsMapping::new()),
        }
    }

    fn read(&self) -> HoldingsMapping {
        self.mapping
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryMappingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MappingRepository for MemoryMappingStore {
    async fn get(&self, security: &str) -> Result<Option<Vec<CandidateInstrument>>> {
        Ok(self.read().get(security).cloned())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.read().keys().cloned().collect())
    }

    async fn save(&self, security: &str, candidates: &[CandidateInstrument]) -> Result<()> {
        if let Ok(mut mapping) = self.mapping.write() {
            mapping.insert(security.to_string(), candidates.to_vec());
        }
        Ok(())
    }

    async fn save_all(&self, new_mapping: &HoldingsMapping) -> Result<()> {
        if let Ok(mut mapping) = self.mapping.write() {
            *mapping = new_mapping.clone();
        }
        Ok(())
    }

    async fn delete(&self, security: &str) -> Result<bool> {
        Ok(self
            .mapping
            .write()
            .map(|mut m| m.remove(security).is_some())
            .unwrap_or(false))
    }

    async fn load_all(&self) -> Result<HoldingsMapping> {
        Ok(self.read())
    }
}

/// File-backed mapping store: one pretty-printed JSON document holding the
/// whole mapping, rewritten through a temp file on every change.
pub struct FileMappingStore {
    path: PathBuf,
    cache: RwLock<HoldingsMapping>,
}

impl FileMappingStore {
    /// Open (or create) the store at `path`, loading any existing content.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mapping = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HoldingsMapping::new()
        };
        info!(path = %path.display(), entries = mapping.len(), "mapping store opened");
        Ok(Self {
            path,
            cache: RwLock::new(mapping),
        })
    }

    fn flush(&self, mapping: &HoldingsMapping) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_vec_pretty(mapping)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read(&self) -> HoldingsMapping {
        self.cache.read().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MappingRepository for FileMappingStore {
    async fn get(&self, security: &str) -> Result<Option<Vec<CandidateInstrument>>> {
        Ok(self.read().get(security).cloned())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.read().keys().cloned().collect())
    }

    async fn save(&self, security: &str, candidates: &[CandidateInstrument]) -> Result<()> {
        let snapshot = {
            let mut mapping = self
                .cache
                .write()
                .unwrap_or_else(|e| e.into_inner());
            mapping.insert(security.to_string(), candidates.to_vec());
            mapping.clone()
        };
        self.flush(&snapshot)
    }

    async fn save_all(&self, new_mapping: &HoldingsMapping) -> Result<()> {
        {
            let mut mapping = self
                .cache
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *mapping = new_mapping.clone();
        }
        self.flush(new_mapping)
    }

    async fn delete(&self, security: &str) -> Result<bool> {
        let (removed, snapshot) = {
            let mut mapping = self
                .cache
                .write()
                .unwrap_or_else(|e| e.into_inner());
            let removed = mapping.remove(security).is_some();
            (removed, mapping.clone())
        };
        if removed {
            self.flush(&snapshot)?;
        }
        Ok(removed)
    }

    async fn load_all(&self) -> Result<HoldingsMapping> {
        Ok(self.read())
    }
}
