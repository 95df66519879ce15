//! Reuse of ingested stores across queries.
//!
//! A [`Session`] owns the immutable [`AnalyzerConfig`] and a bounded TTL cache
//! of built stores keyed by path. A cached store is reused only while the
//! file's length and modification time are unchanged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use panconf_core::TtlCache;

use crate::cancel::CancelToken;
use crate::config::AnalyzerConfig;
use crate::ingest::{ingest_file, IngestError, IngestOptions};
use crate::progress::ProgressReporter;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Self, IngestError> {
        let metadata = fs::metadata(path).map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

#[derive(Debug, Clone)]
struct CachedStore {
    store: Arc<EntityStore>,
    stamp: FileStamp,
}

#[derive(Debug)]
pub struct Session {
    config: Arc<AnalyzerConfig>,
    stores: TtlCache<PathBuf, CachedStore>,
}

impl Session {
    /// Fails only when the cache sweep thread cannot be started.
    pub fn new(config: AnalyzerConfig) -> io::Result<Self> {
        let stores = TtlCache::new(config.cache_ttl, config.cache_capacity)?;
        Ok(Self {
            config: Arc::new(config),
            stores,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The store for `path`, from cache when the file is unchanged.
    pub fn load(
        &self,
        path: &Path,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> Result<Arc<EntityStore>, IngestError> {
        let stamp = FileStamp::of(path)?;
        if let Some(cached) = self.stores.get(&path.to_path_buf()) {
            if cached.stamp == stamp {
                tracing::debug!(path = %path.display(), "reusing cached store");
                return Ok(cached.store);
            }
        }
        self.ingest(path, stamp, cancel, progress)
    }

    /// Re-ingest `path` whether or not a cached store exists.
    pub fn refresh(
        &self,
        path: &Path,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> Result<Arc<EntityStore>, IngestError> {
        let stamp = FileStamp::of(path)?;
        self.ingest(path, stamp, cancel, progress)
    }

    /// Drop the cached store for `path`; returns whether one was live.
    pub fn forget(&self, path: &Path) -> bool {
        self.stores.delete(&path.to_path_buf()).is_some()
    }

    pub fn cached_files(&self) -> usize {
        self.stores.len()
    }

    /// Stop the cache sweep and release every cached store.
    pub fn close(&self) {
        self.stores.close();
    }

    fn ingest(
        &self,
        path: &Path,
        stamp: FileStamp,
        cancel: &CancelToken,
        progress: &ProgressReporter,
    ) -> Result<Arc<EntityStore>, IngestError> {
        let ingested = ingest_file(
            path,
            IngestOptions {
                config: &self.config,
                cancel,
                progress,
            },
        )?;
        cancel.check()?;
        let store = Arc::new(EntityStore::build(ingested.records));
        self.stores.set(
            path.to_path_buf(),
            CachedStore {
                store: Arc::clone(&store),
                stamp,
            },
        );
        Ok(store)
    }
}
