//! Staging of intermediate revisions.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Holds the revisions produced between stages.
///
/// Without a directory every stage works in memory. With one, each
/// intermediate revision is written to a temporary file in it and read back
/// before the next stage. Staged files are deleted when the workspace is
/// dropped, whether or not the operation succeeded.
#[derive(Debug)]
pub struct Workspace {
    directory: Option<PathBuf>,
    staged: Vec<NamedTempFile>,
}

impl Workspace {
    /// Workspace staging into `directory`, or in memory when `None`.
    pub fn new(directory: Option<&Path>) -> Self {
        Self {
            directory: directory.map(Path::to_path_buf),
            staged: Vec::new(),
        }
    }

    /// Stage the output of `stage` and return the bytes the next stage reads.
    pub fn stage(&mut self, stage: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let directory = match &self.directory {
            Some(directory) => directory,
            None => return Ok(bytes),
        };

        let mut file = tempfile::Builder::new()
            .prefix("pdf_pades-")
            .suffix(&format!("-{}.pdf", stage))
            .tempfile_in(directory)?;
        file.write_all(&bytes)?;
        file.flush()?;
        drop(bytes);

        let mut staged = Vec::new();
        file.reopen()?.read_to_end(&mut staged)?;
        log::debug!("Staged {} ({} bytes) at {}", stage, staged.len(), file.path().display());
        self.staged.push(file);
        Ok(staged)
    }

    /// Paths of the files staged so far.
    pub fn staged_paths(&self) -> Vec<&Path> {
        self.staged.iter().map(NamedTempFile::path).collect()
    }
}
