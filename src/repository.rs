//! Versioned file repository
//!
//! Every submission owns a folder `<root>/<ACRONYM>/<submission_id>/`. The
//! uploaded file is relocated there and the parser writes its output next to it.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Dataset/version-scoped file storage on the local filesystem
#[derive(Clone, Debug)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    /// Use `root` as the repository directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Folder holding the files of one submission
    pub fn data_folder(&self, acronym: &str, submission_id: u32) -> PathBuf {
        self.root.join(acronym).join(submission_id.to_string())
    }

    /// Where `filename` lives inside the submission's folder
    ///
    /// Only the final path component of `filename` is used.
    pub fn file_path(&self, acronym: &str, submission_id: u32, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "upload".into());
        self.data_folder(acronym, submission_id).join(name)
    }

    /// Create the submission's folder, returning `None` if it already exists
    ///
    /// The folder is created with a single non-recursive `mkdir`, so of several
    /// callers racing for the same version exactly one gets `Some`.
    pub async fn reserve_data_folder(
        &self,
        acronym: &str,
        submission_id: u32,
    ) -> Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(self.root.join(acronym)).await?;

        let folder = self.data_folder(acronym, submission_id);
        match tokio::fs::create_dir(&folder).await {
            Ok(()) => Ok(Some(folder)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a submission's folder with everything in it; a missing folder is not an error
    pub async fn remove_data_folder(&self, folder: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(folder).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy `source` into the submission's folder as `filename` and return the new path
    ///
    /// An existing file of the same name is replaced.
    pub async fn copy_file(
        &self,
        acronym: &str,
        submission_id: u32,
        source: &Path,
        filename: &str,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(self.data_folder(acronym, submission_id)).await?;
        let destination = self.file_path(acronym, submission_id, filename);

        tokio::fs::copy(source, &destination).await?;
        tracing::debug!(
            acronym,
            submission_id,
            path = %destination.display(),
            "file relocated into repository"
        );

        Ok(destination)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn copy_places_file_under_acronym_and_version() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new(dir.path().join("repo"));
        let source = dir.path().join("download.tmp");
        tokio::fs::write(&source, b"<rdf/>").await.unwrap();

        let path = repo.copy_file("ABC", 4, &source, "abc.owl").await.unwrap();

        assert_eq!(path, dir.path().join("repo/ABC/4/abc.owl"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"<rdf/>");
        assert!(source.exists(), "copy leaves the source alone");
    }

    #[tokio::test]
    async fn filename_cannot_escape_the_data_folder() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new(dir.path());
        let source = dir.path().join("src");
        tokio::fs::write(&source, b"x").await.unwrap();

        let path = repo
            .copy_file("ABC", 1, &source, "../../etc/passwd")
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("ABC/1/passwd"));
    }

    #[tokio::test]
    async fn data_folder_is_reserved_only_once() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new(dir.path());

        let first = repo.reserve_data_folder("ABC", 2).await.unwrap();
        let second = repo.reserve_data_folder("ABC", 2).await.unwrap();

        assert_eq!(first, Some(dir.path().join("ABC/2")));
        assert_eq!(second, None);
        assert!(dir.path().join("ABC/2").is_dir());
    }

    #[tokio::test]
    async fn removing_data_folder_takes_its_contents() {
        let dir = TempDir::new().unwrap();
        let repo = FileRepository::new(dir.path());
        let folder = repo.reserve_data_folder("ABC", 1).await.unwrap().unwrap();
        tokio::fs::write(folder.join("abc.owl"), b"x").await.unwrap();
        tokio::fs::create_dir(folder.join("owlapi")).await.unwrap();

        repo.remove_data_folder(&folder).await.unwrap();
        repo.remove_data_folder(&folder).await.unwrap();

        assert!(!folder.exists());
        assert!(dir.path().join("ABC").is_dir());
    }
}
