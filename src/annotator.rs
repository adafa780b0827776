//! Annotator collaborator
//!
//! The annotator stage builds a term cache for one submission and then
//! regenerates the shared dictionary file.

use crate::config::AnnotatorConfig;
use crate::error::{Error, Result};
use crate::types::Submission;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Term cache and dictionary builder
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Build the term cache for `submission`
    async fn create_term_cache(&self, submission: &Submission) -> Result<()>;

    /// Regenerate the dictionary from every cached term
    async fn generate_dictionary(&self) -> Result<()>;
}

/// Annotator backed by an external binary
///
/// Invoked as `<binary> cache --submission <id> --input <file>` and
/// `<binary> dictionary`.
pub struct CliAnnotator {
    binary_path: PathBuf,
    timeout: Duration,
}

impl CliAnnotator {
    /// Create an annotator with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Build from config: explicit path first, then `ontology-annotator` in PATH
    pub fn from_config(config: &AnnotatorConfig) -> Option<Self> {
        let path = match &config.binary_path {
            Some(path) => path.clone(),
            None => which::which("ontology-annotator").ok()?,
        };
        Some(Self::new(path, config.timeout))
    }

    async fn run(&self, step: &str, command: &mut Command) -> Result<()> {
        command.stdin(Stdio::null()).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("annotator {}", step),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute annotator: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "annotator {} failed ({}): {}",
                step,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Annotator for CliAnnotator {
    async fn create_term_cache(&self, submission: &Submission) -> Result<()> {
        let input = submission
            .upload_file_path
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("file of submission {}", submission.id)))?;

        let mut command = Command::new(&self.binary_path);
        command
            .arg("cache")
            .arg("--submission")
            .arg(submission.id.as_str())
            .arg("--input")
            .arg(input);
        self.run("cache", &mut command).await
    }

    async fn generate_dictionary(&self) -> Result<()> {
        let mut command = Command::new(&self.binary_path);
        command.arg("dictionary");
        self.run("dictionary", &mut command).await
    }
}

/// Annotator used when none is configured; every call fails
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpAnnotator;

#[async_trait]
impl Annotator for NoOpAnnotator {
    async fn create_term_cache(&self, _submission: &Submission) -> Result<()> {
        Err(Error::NotSupported("annotator is not configured".to_string()))
    }

    async fn generate_dictionary(&self) -> Result<()> {
        Err(Error::NotSupported("annotator is not configured".to_string()))
    }
}
