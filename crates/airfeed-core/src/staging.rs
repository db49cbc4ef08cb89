use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Cycle-local file locations. Names carry a random suffix so concurrent
/// instances sharing a directory never collide.
#[derive(Debug, Clone)]
pub struct CycleWorkspace {
    raw_path: PathBuf,
    candidate_path: PathBuf,
}

impl CycleWorkspace {
    pub fn new(staging_dir: &Path, published_path: &Path) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        let stem = published_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let file_name = published_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());

        Self {
            raw_path: staging_dir.join(format!("{stem}.{token}.raw.csv")),
            // Next to the published file so publishing is a same-volume rename.
            candidate_path: published_path.with_file_name(format!(".{file_name}.{token}.tmp")),
        }
    }

    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    pub fn candidate_path(&self) -> &Path {
        &self.candidate_path
    }

    /// Remove whatever staging files this cycle left behind.
    pub async fn cleanup(&self) {
        for path in [&self.raw_path, &self.candidate_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "removed staging file"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove staging file")
                }
            }
        }
    }
}
