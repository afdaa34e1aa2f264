use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::ManualError;

/// Per-run working directory for intermediate manual files.
///
/// Every file written or announced through it is removed by [`cleanup`](Self::cleanup).
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    files: Vec<PathBuf>,
}

impl ScratchDir {
    /// Create `{root}/{label}-{run}`.
    pub async fn create(root: &Path, label: &str) -> Result<Self, ManualError> {
        let run = Uuid::new_v4().simple().to_string();
        let path = root.join(format!("{label}-{}", &run[..8]));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| ManualError::Scratch {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            files: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, ManualError> {
        let target = self.track(name);
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|source| ManualError::Scratch {
                path: target.clone(),
                source,
            })?;
        Ok(target)
    }

    /// Register a file some other process will create in this directory.
    pub fn track(&mut self, name: &str) -> PathBuf {
        let target = self.path.join(name);
        if !self.files.contains(&target) {
            self.files.push(target.clone());
        }
        target
    }

    /// Best-effort removal. Individual failures are collected into one warning; a directory
    /// that cannot be removed is left behind.
    pub async fn cleanup(self) -> usize {
        let mut failures = Vec::new();
        for file in &self.files {
            match tokio::fs::remove_file(file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => failures.push(format!("{}: {e}", file.display())),
            }
        }
        if !failures.is_empty() {
            warn!(
                dir = %self.path.display(),
                failed = failures.len(),
                errors = ?failures,
                "[manual] scratch cleanup incomplete"
            );
        }
        if let Err(e) = tokio::fs::remove_dir(&self.path).await {
            debug!(dir = %self.path.display(), error = %e, "[manual] scratch dir left in place");
        }
        failures.len()
    }
}
