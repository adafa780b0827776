//! Shared test doubles and fixtures
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::annotator::Annotator;
use crate::db::Database;
use crate::error::{Error, ParseError, Result};
use crate::fetcher::{ContentFetcher, DownloadedFile};
use crate::notify::NotificationSink;
use crate::parser::{ParseOptions, ParseReport, ParsingOracle};
use crate::stages::{MetricsCalculator, SearchIndexer};
use crate::types::{Dataset, Metrics, OntologyLanguage, Submission, SubmissionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Fresh SQLite database inside its own temp dir
pub async fn temp_db() -> (Arc<Database>, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("test.db")).await.unwrap();
    (Arc::new(db), dir)
}

/// Register `acronym` and save submission `n` whose file holds `content`
pub async fn seed_submission(
    db: &Database,
    dir: &Path,
    acronym: &str,
    n: u32,
    content: &str,
    pull_location: Option<&str>,
) -> Submission {
    db.insert_dataset(&Dataset::new(acronym)).await.unwrap();

    let folder = dir.join("seed").join(acronym).join(n.to_string());
    std::fs::create_dir_all(&folder).unwrap();
    let file = folder.join(format!("{}.owl", acronym.to_lowercase()));
    std::fs::write(&file, content).unwrap();

    let mut submission = Submission::new(acronym, n, OntologyLanguage::Owl);
    submission.upload_file_path = Some(file);
    submission.pull_location = pull_location.map(str::to_string);
    submission.description = Some(format!("{} ontology", acronym));
    db.insert_submission(&submission).await.unwrap()
}

/// Oracle that accepts everything except files containing `BROKEN`
#[derive(Default)]
pub struct FakeOracle {
    pub missing_imports: Vec<String>,
    pub calls: Mutex<Vec<(PathBuf, ParseOptions)>>,
    /// Sleep before answering, to exercise parser timeouts
    pub delay: Option<Duration>,
}

impl FakeOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ParsingOracle for FakeOracle {
    async fn parse(
        &self,
        input: &Path,
        output_dir: &Path,
        options: ParseOptions,
    ) -> Result<ParseReport> {
        self.calls
            .lock()
            .unwrap()
            .push((input.to_path_buf(), options));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        std::fs::create_dir_all(output_dir)?;

        let content = std::fs::read_to_string(input)?;
        if content.contains("BROKEN") {
            return Err(ParseError::Rejected {
                file: input.display().to_string(),
                cause: "unexpected token".to_string(),
            }
            .into());
        }
        Ok(ParseReport {
            missing_imports: self.missing_imports.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Fetcher serving an in-memory map of URL to bytes
pub struct FakeFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    temp_dir: TempDir,
    pub exists_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    panic_on: Option<String>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            temp_dir: TempDir::new().unwrap(),
            exists_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            panic_on: None,
        }
    }

    pub fn with_file(self, url: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), content.as_bytes().to_vec());
        self
    }

    /// Panic when `url` is probed
    pub fn panicking_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    pub fn network_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst) + self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn remote_file_exists(&self, url: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(url) {
            panic!("fetcher exploded on {url}");
        }
        Ok(self.files.lock().unwrap().contains_key(url))
    }

    async fn download(&self, url: &str) -> Result<DownloadedFile> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(url.to_string()))?;

        let mut file = tempfile::NamedTempFile::new_in(self.temp_dir.path())?;
        file.write_all(&bytes)?;
        file.flush()?;

        let filename = url.rsplit('/').next().unwrap_or("download").to_string();
        Ok(DownloadedFile { file, filename })
    }
}

/// Notifier that records every call
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<SubmissionId>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<SubmissionId> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn remote_file_missing(&self, submission: &Submission) -> Result<()> {
        self.notices.lock().unwrap().push(submission.id.clone());
        Ok(())
    }
}

/// Indexer that succeeds or fails on demand
#[derive(Default)]
pub struct FakeIndexer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SearchIndexer for FakeIndexer {
    async fn index(&self, _submission: &Submission) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::ExternalTool("index backend unavailable".to_string()));
        }
        Ok(())
    }
}

/// Metrics calculator returning fixed numbers
#[derive(Default)]
pub struct FakeMetrics;

#[async_trait]
impl MetricsCalculator for FakeMetrics {
    async fn compute(&self, _submission: &Submission) -> Result<Metrics> {
        Ok(Metrics {
            classes: 42,
            individuals: 3,
            properties: 7,
            max_depth: 5,
        })
    }
}

/// Annotator that succeeds or fails on demand
#[derive(Default)]
pub struct FakeAnnotator {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Annotator for FakeAnnotator {
    async fn create_term_cache(&self, _submission: &Submission) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::ExternalTool("term cache build failed".to_string()));
        }
        Ok(())
    }

    async fn generate_dictionary(&self) -> Result<()> {
        Ok(())
    }
}
