//! Staleness-aware frame table cache
//!
//! The decoded table is persisted next to its source in tabular form and
//! reused while it is at least as new as the source. This is a single-entry
//! memoization, not a shared cache: one run at a time per cache path.

use crate::tabular;
use crate::types::{FrameTable, PipelineError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Source/cache pair with their modification times (`None` = file absent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor {
    pub source_path: PathBuf,
    pub cache_path: PathBuf,
    pub source_modified_at: Option<Timestamp>,
    pub cache_modified_at: Option<Timestamp>,
}

impl CacheDescriptor {
    /// Build a descriptor from file-system metadata
    pub fn probe(source_path: impl Into<PathBuf>, cache_path: impl Into<PathBuf>) -> Result<Self> {
        let source_path = source_path.into();
        let cache_path = cache_path.into();
        let source_modified_at = modified_at(&source_path)?;
        let cache_modified_at = modified_at(&cache_path)?;

        log::debug!(
            "Cache probe: source {:?} modified {:?}, cache {:?} modified {:?}",
            source_path,
            source_modified_at,
            cache_path,
            cache_modified_at
        );

        Ok(Self {
            source_path,
            cache_path,
            source_modified_at,
            cache_modified_at,
        })
    }

    /// True if the cache exists and is not older than the source
    ///
    /// A cache whose source has disappeared stays valid.
    pub fn is_valid(&self) -> bool {
        match (self.cache_modified_at, self.source_modified_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(cache), Some(source)) => cache >= source,
        }
    }

    pub fn source_exists(&self) -> bool {
        self.source_modified_at.is_some()
    }
}

/// Modification time of a path, or `None` if it does not exist
fn modified_at(path: &Path) -> Result<Option<Timestamp>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(Timestamp::from(meta.modified()?))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Which path [`CacheCoordinator::ensure_table`] took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Cache was absent or stale; the table was decoded and persisted
    Regenerated,
    /// Cache was fresh and read back
    Reused,
    /// Cache was ignored on request; the table was decoded and persisted
    Bypassed,
}

/// Decides between decoding the source and reading the persisted table
///
/// Not reentrant for a given cache path: concurrent runs writing the same
/// cache file are undefined.
#[derive(Debug, Default, Clone)]
pub struct CacheCoordinator {
    bypass: bool,
}

impl CacheCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: always regenerate, never read the cache
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    /// Return the table for `descriptor`, regenerating the cache if needed
    ///
    /// `decode_fn` receives the source path and is only called when the cache
    /// cannot be used.
    pub fn ensure_table<F>(&self, descriptor: &CacheDescriptor, decode_fn: F) -> Result<(FrameTable, CacheStatus)>
    where
        F: FnOnce(&Path) -> Result<FrameTable>,
    {
        if !self.bypass && descriptor.is_valid() {
            log::info!("Reusing cached table: {:?}", descriptor.cache_path);
            let table = tabular::read_table_file(&descriptor.cache_path).map_err(|e| {
                PipelineError::CacheUnreadable {
                    path: descriptor.cache_path.clone(),
                    reason: e.to_string(),
                }
            })?;
            return Ok((table, CacheStatus::Reused));
        }

        if !descriptor.source_exists() {
            return Err(PipelineError::SourceNotFound(descriptor.source_path.clone()));
        }

        let status = if self.bypass {
            log::info!("Cache bypass requested, regenerating {:?}", descriptor.cache_path);
            CacheStatus::Bypassed
        } else if descriptor.cache_modified_at.is_none() {
            log::info!("No cache at {:?}, generating", descriptor.cache_path);
            CacheStatus::Regenerated
        } else {
            log::info!("Cache {:?} is older than source, regenerating", descriptor.cache_path);
            CacheStatus::Regenerated
        };

        let table = decode_fn(&descriptor.source_path)?;
        tabular::write_table_file(&table, &descriptor.cache_path)?;

        Ok((table, status))
    }
}
