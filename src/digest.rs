//! Content digests and change detection
//!
//! A fetched file is new content when no previous file exists for the dataset
//! or when its MD5 digest differs from the previous file's.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of comparing a downloaded file against the stored one
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentChange {
    /// No previous file exists
    New {
        /// Digest of the downloaded file
        digest: String,
    },
    /// The previous file differs
    Changed {
        /// Digest of the stored file
        previous: String,
        /// Digest of the downloaded file
        current: String,
    },
    /// Same bytes as the stored file
    Unchanged {
        /// Shared digest
        digest: String,
    },
}

impl ContentChange {
    /// Whether a new submission should be created
    pub fn is_new_content(&self) -> bool {
        !matches!(self, ContentChange::Unchanged { .. })
    }
}

/// Hex MD5 digest of a file, streamed in chunks on a blocking thread
pub async fn file_md5(path: &Path) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut context = md5::Context::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            context.consume(&buf[..n]);
        }
        Ok::<_, Error>(format!("{:x}", context.compute()))
    })
    .await
    .map_err(|e| Error::Other(format!("digest task failed: {e}")))?
}

/// Compare `downloaded` against `previous`
///
/// A `previous` path that is `None` or does not exist on disk means new
/// content. A previous file that exists but cannot be read is an error.
pub async fn detect_change(downloaded: &Path, previous: Option<&Path>) -> Result<ContentChange> {
    let current = file_md5(downloaded).await?;

    let Some(previous) = previous.filter(|p| p.exists()) else {
        return Ok(ContentChange::New { digest: current });
    };

    let previous = file_md5(previous).await?;
    if previous == current {
        Ok(ContentChange::Unchanged { digest: current })
    } else {
        Ok(ContentChange::Changed { previous, current })
    }
}
