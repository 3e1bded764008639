//! Configuration for signing and prolongation.

use std::path::{Path, PathBuf};

use chrono::Duration;

use crate::error::{Error, Result};

/// Default size reserved for an approval signature's CMS container.
pub const DEFAULT_SIGNATURE_SIZE: usize = 8192;

/// Default margin before evidence or a certificate expires at which
/// prolongation refreshes it.
pub const DEFAULT_REFRESH_MARGIN_DAYS: i64 = 7;

/// PAdES signer configuration.
#[derive(Debug, Clone)]
pub struct PadesConfig {
    /// Directory used to stage intermediate revisions.
    ///
    /// `None` means single-pass construction in memory.
    pub temporary_directory_path: Option<PathBuf>,

    /// How close to `nextUpdate` (or certificate expiry) evidence must be
    /// before prolongation fetches fresh evidence.
    pub refresh_margin: Duration,

    /// Estimated size of the DER-encoded approval signature in bytes.
    pub estimated_signature_size: usize,
}

impl Default for PadesConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PadesConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            temporary_directory_path: None,
            refresh_margin: Duration::days(DEFAULT_REFRESH_MARGIN_DAYS),
            estimated_signature_size: DEFAULT_SIGNATURE_SIZE,
        }
    }

    /// Stage intermediate revisions in the given directory.
    pub fn with_temporary_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.temporary_directory_path = Some(path.into());
        self
    }

    /// Set the refresh margin used during prolongation.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Set the estimated approval signature size.
    pub fn with_estimated_signature_size(mut self, size: usize) -> Self {
        self.estimated_signature_size = size;
        self
    }

    /// Check that the staging path, when configured, names an existing directory.
    pub fn validate(&self) -> Result<Option<&Path>> {
        match &self.temporary_directory_path {
            None => Ok(None),
            Some(path) if path.is_dir() => Ok(Some(path.as_path())),
            Some(path) => Err(Error::PathIsNotDirectory(path.clone())),
        }
    }
}
