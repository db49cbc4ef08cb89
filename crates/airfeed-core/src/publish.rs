//! Atomic replacement of the published dataset.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PublishError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub published_path: PathBuf,
    pub digest: String,
    pub bytes: u64,
}

/// Move `candidate` onto `published` so readers only ever see a complete file.
///
/// Uses a rename when both paths share a volume; otherwise copies into a
/// sibling temp file of `published` and renames that. The existing published
/// file is untouched on failure.
pub async fn publish(candidate: &Path, published: &Path) -> Result<PublishOutcome, PublishError> {
    let prepare_err = |path: &Path, source| PublishError::Prepare {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = published.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| prepare_err(parent, source))?;
    }

    let (digest, bytes) = digest_file(candidate)
        .await
        .map_err(|source| prepare_err(candidate, source))?;
    sync_file(candidate)
        .await
        .map_err(|source| prepare_err(candidate, source))?;

    match fs::rename(candidate, published).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            warn!(
                candidate = %candidate.display(),
                published = %published.display(),
                "candidate is on another volume; copying through a sibling temp file"
            );
            replace_via_sibling(candidate, published).await?;
        }
        Err(source) => {
            return Err(PublishError::Replace {
                candidate: candidate.to_path_buf(),
                published: published.to_path_buf(),
                source,
            })
        }
    }

    sync_parent_dir(published).await;

    info!(path = %published.display(), digest = %digest, bytes, "dataset published");
    Ok(PublishOutcome {
        published_path: published.to_path_buf(),
        digest,
        bytes,
    })
}

/// Copy `candidate` into a sibling of `published` and rename it into place.
pub(crate) async fn replace_via_sibling(candidate: &Path, published: &Path) -> Result<(), PublishError> {
    let sibling = sibling_temp_path(published);
    let replace_err = |source| PublishError::Replace {
        candidate: candidate.to_path_buf(),
        published: published.to_path_buf(),
        source,
    };

    let staged = async {
        fs::copy(candidate, &sibling).await?;
        sync_file(&sibling).await?;
        fs::rename(&sibling, published).await
    }
    .await;

    if let Err(err) = staged {
        if let Err(cleanup) = fs::remove_file(&sibling).await {
            if cleanup.kind() != ErrorKind::NotFound {
                warn!(path = %sibling.display(), error = %cleanup, "failed to remove sibling temp file");
            }
        }
        return Err(replace_err(err));
    }

    if let Err(err) = fs::remove_file(candidate).await {
        warn!(path = %candidate.display(), error = %err, "failed to remove copied candidate");
    }
    Ok(())
}

/// A uniquely named hidden file in the same directory as `published`.
pub fn sibling_temp_path(published: &Path) -> PathBuf {
    let name = published
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    published.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

async fn sync_file(path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    let result = async { File::open(parent).await?.sync_all().await }.await;
    if let Err(err) = result {
        warn!(dir = %parent.display(), error = %err, "failed to sync directory after publish");
    }
}

#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) {}

/// BLAKE3 hex digest and length of a file's contents.
pub async fn digest_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = File::open(path).await?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }
    Ok((hasher.finalize().to_hex().to_string(), total))
}
