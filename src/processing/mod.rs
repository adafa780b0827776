//! Queue consumer and per-submission processing
//!
//! [`QueueConsumer::process_all`] reads the action queue once and handles each
//! entry in turn:
//!
//! 1. claim the entry (at-most-once) or remember it for acknowledgement
//!    (at-least-once)
//! 2. make sure the submission's file is present locally, downloading it again
//!    from the pull location when needed
//! 3. run [`SubmissionProcessor::process`], the structural stage plus whichever
//!    of indexing and metrics were requested
//! 4. run the annotator stage when requested
//!
//! Stage failures become `ERROR_*` status flags on the saved submission. Any
//! other failure, including a panic, is contained to its entry.

use crate::annotator::{Annotator, CliAnnotator, NoOpAnnotator};
use crate::config::{ClaimMode, Config};
use crate::error::{Error, Result, StageError};
use crate::fetcher::{ContentFetcher, HttpFetcher};
use crate::isolation::run_isolated;
use crate::parser::{ParseOptions, ParsingOracle};
use crate::queue::{ActionQueue, QueueItem};
use crate::repository::FileRepository;
use crate::stages::{MetricsCalculator, NoOpMetricsCalculator, NoOpSearchIndexer, SearchIndexer};
use crate::store::MetadataStore;
use crate::types::{Action, ActionSet, Event, ItemFailure, StatusCode, StatusFlag, Submission, SubmissionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::Instrument;

const PARSED: [StatusCode; 2] = [StatusCode::Rdf, StatusCode::RdfLabels];

/// Outcome of one consumer sweep
#[derive(Clone, Debug, Default)]
pub struct ProcessReport {
    /// Submissions that went through every requested stage
    pub processed: Vec<SubmissionId>,
    /// Entries whose handling failed
    pub failures: Vec<ItemFailure>,
    /// Entries another consumer claimed first
    pub skipped_claims: usize,
}

/// Drives one submission through the requested stages
#[derive(Clone)]
pub struct SubmissionProcessor {
    store: Arc<dyn MetadataStore>,
    repository: FileRepository,
    oracle: Arc<dyn ParsingOracle>,
    indexer: Arc<dyn SearchIndexer>,
    metrics: Arc<dyn MetricsCalculator>,
    annotator: Arc<dyn Annotator>,
    parser_timeout: Duration,
}

impl SubmissionProcessor {
    /// Create a processor with no-op indexer, metrics and annotator
    pub fn new(
        store: Arc<dyn MetadataStore>,
        repository: FileRepository,
        oracle: Arc<dyn ParsingOracle>,
        parser_timeout: Duration,
    ) -> Self {
        Self {
            store,
            repository,
            oracle,
            indexer: Arc::new(NoOpSearchIndexer),
            metrics: Arc::new(NoOpMetricsCalculator),
            annotator: Arc::new(NoOpAnnotator),
            parser_timeout,
        }
    }

    /// Use `indexer` for the search index stage
    pub fn with_indexer(mut self, indexer: Arc<dyn SearchIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    /// Use `metrics` for the metrics stage
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCalculator>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use `annotator` for the annotator stage
    pub fn with_annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotator = annotator;
        self
    }

    /// Structural processing: parse, index and metrics as requested, then save
    ///
    /// # Errors
    ///
    /// A submission without a local file fails with
    /// [`StageError::MissingFile`]. Stage failures are recorded as flags and
    /// do not produce an error.
    pub async fn process(&self, submission: &mut Submission, actions: &ActionSet) -> Result<()> {
        if !submission.has_local_file() {
            return Err(StageError::MissingFile {
                submission: submission.id.to_string(),
            }
            .into());
        }
        submission.statuses.add(StatusFlag::ok(StatusCode::Uploaded));

        if actions.contains(Action::ProcessRdf) {
            self.parse(submission).await;
        }
        if actions.contains(Action::IndexSearch) {
            self.index(submission).await;
        }
        if actions.contains(Action::RunMetrics) {
            self.compute_metrics(submission).await;
        }

        self.store.save_submission(submission).await
    }

    async fn parse(&self, submission: &mut Submission) {
        for code in PARSED {
            submission.statuses.remove(code);
        }

        let Some(input) = submission.upload_file_path.clone() else {
            return;
        };
        let output_dir = self
            .repository
            .data_folder(&submission.acronym, submission.submission_id);

        let result = tokio::time::timeout(
            self.parser_timeout,
            self.oracle
                .parse(&input, &output_dir, ParseOptions { reasoner: true }),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("parsing {}", input.display()),
            seconds: self.parser_timeout.as_secs(),
        })
        .and_then(|r| r);

        match result {
            Ok(report) => {
                for code in PARSED {
                    submission.statuses.add(StatusFlag::ok(code));
                }
                submission.missing_imports = Some(report.missing_imports);
                tracing::info!(submission_id = %submission.id, "structural parse succeeded");
            }
            Err(e) => {
                submission.statuses.add(StatusFlag::error(StatusCode::Rdf));
                tracing::error!(submission_id = %submission.id, error = %e, "structural parse failed");
            }
        }
    }

    async fn index(&self, submission: &mut Submission) {
        if !submission.statuses.is_ready(&[StatusCode::Rdf]) {
            tracing::error!(submission_id = %submission.id, "cannot index a submission that has not been parsed");
            submission.statuses.add(StatusFlag::error(StatusCode::Indexed));
            return;
        }

        match self.indexer.index(submission).await {
            Ok(()) => submission.statuses.add(StatusFlag::ok(StatusCode::Indexed)),
            Err(Error::NotSupported(msg)) => {
                tracing::warn!(submission_id = %submission.id, reason = %msg, "search indexing skipped");
            }
            Err(e) => {
                tracing::error!(submission_id = %submission.id, error = %e, "search indexing failed");
                submission.statuses.add(StatusFlag::error(StatusCode::Indexed));
            }
        }
    }

    async fn compute_metrics(&self, submission: &mut Submission) {
        if !submission.statuses.is_ready(&[StatusCode::Rdf]) {
            tracing::error!(submission_id = %submission.id, "cannot compute metrics for a submission that has not been parsed");
            submission.statuses.add(StatusFlag::error(StatusCode::Metrics));
            return;
        }

        match self.metrics.compute(submission).await {
            Ok(metrics) => {
                submission.metrics = Some(metrics);
                submission.statuses.add(StatusFlag::ok(StatusCode::Metrics));
            }
            Err(Error::NotSupported(msg)) => {
                tracing::warn!(submission_id = %submission.id, reason = %msg, "metrics skipped");
            }
            Err(e) => {
                tracing::error!(submission_id = %submission.id, error = %e, "metrics calculation failed");
                submission.statuses.add(StatusFlag::error(StatusCode::Metrics));
            }
        }
    }

    /// Annotator stage: term cache plus dictionary, then save
    ///
    /// # Errors
    ///
    /// Fails with [`StageError::PreconditionFailed`] when the submission has
    /// not been parsed; nothing is changed in that case. An annotator failure
    /// is recorded as `ERROR_ANNOTATOR` and is not an error.
    pub async fn process_annotator(&self, submission: &mut Submission) -> Result<()> {
        if !submission.statuses.is_ready(&PARSED) {
            return Err(StageError::PreconditionFailed {
                stage: "annotator",
                submission: submission.id.to_string(),
                reason: "it has not been successfully parsed".to_string(),
            }
            .into());
        }

        submission.statuses.remove(StatusCode::Annotator);

        let result = match self.annotator.create_term_cache(submission).await {
            Ok(()) => self.annotator.generate_dictionary().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                submission.statuses.add(StatusFlag::ok(StatusCode::Annotator));
                tracing::info!(submission_id = %submission.id, "annotator entries generated");
            }
            Err(e) => {
                submission.statuses.add(StatusFlag::error(StatusCode::Annotator));
                tracing::error!(submission_id = %submission.id, error = %e, "annotator stage failed");
            }
        }

        self.store.save_submission(submission).await
    }
}

/// Drains the action queue and processes each entry
pub struct QueueConsumer {
    queue: ActionQueue,
    store: Arc<dyn MetadataStore>,
    fetcher: Arc<dyn ContentFetcher>,
    repository: FileRepository,
    processor: SubmissionProcessor,
    event_tx: broadcast::Sender<Event>,
}

impl QueueConsumer {
    /// Create a consumer using the HTTP fetcher and the annotator from `config`
    ///
    /// Indexing and metrics default to the no-op implementations. The annotator
    /// is the CLI one when its binary can be found.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn MetadataStore>,
        queue: ActionQueue,
        oracle: Arc<dyn ParsingOracle>,
    ) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch.clone(), config.storage.temp_dir.clone())?;
        let repository = FileRepository::new(config.storage.repository_dir.clone());
        let mut processor = SubmissionProcessor::new(
            store.clone(),
            repository.clone(),
            oracle,
            config.parser.timeout,
        );
        if let Some(annotator) = CliAnnotator::from_config(&config.annotator) {
            processor = processor.with_annotator(Arc::new(annotator));
        }
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            queue,
            store,
            fetcher: Arc::new(fetcher),
            repository,
            processor,
            event_tx,
        })
    }

    /// Replace the content fetcher used to recover missing files
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the stage processor
    pub fn with_processor(mut self, processor: SubmissionProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// The stage processor, for customising its collaborators
    pub fn processor(&self) -> &SubmissionProcessor {
        &self.processor
    }

    /// Subscribe to processing events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Handle every entry currently in the queue
    ///
    /// # Errors
    ///
    /// Only a failure to read the queue is returned; per-entry failures are
    /// recorded in the report.
    pub async fn process_all(&self) -> Result<ProcessReport> {
        let span = tracing::info_span!("process_queue");
        self.process_all_inner().instrument(span).await
    }

    async fn process_all_inner(&self) -> Result<ProcessReport> {
        let mode = self.queue.claim_mode();
        let items = self.queue.queued_items().await?;
        tracing::info!(entries = items.len(), mode = ?mode, "processing queued submissions");

        let mut report = ProcessReport::default();
        for item in items {
            if mode == ClaimMode::AtMostOnce {
                match self.queue.claim(&item).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(submission_id = %item.id, "entry claimed elsewhere");
                        report.skipped_claims += 1;
                        continue;
                    }
                    Err(e) => {
                        self.record_failure(&mut report, &item.id, &e);
                        continue;
                    }
                }
            }

            let span = tracing::info_span!("process_submission", submission_id = %item.id);
            let result = run_isolated(item.id.as_str(), self.process_item(&item))
                .instrument(span)
                .await;

            match result {
                Ok(true) => {
                    self.event_tx
                        .send(Event::SubmissionProcessed {
                            id: item.id.clone(),
                        })
                        .ok();
                    report.processed.push(item.id.clone());
                }
                Ok(false) => {}
                Err(e) => self.record_failure(&mut report, &item.id, &e),
            }

            if mode == ClaimMode::AtLeastOnce {
                match self.queue.acknowledge(&item).await {
                    Ok(true) => {}
                    Ok(false) => tracing::info!(
                        submission_id = %item.id,
                        "entry changed while processing, left queued"
                    ),
                    Err(e) => tracing::error!(
                        submission_id = %item.id,
                        error = %e,
                        "failed to acknowledge queue entry"
                    ),
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            failures = report.failures.len(),
            "queue sweep finished"
        );
        Ok(report)
    }

    fn record_failure(&self, report: &mut ProcessReport, id: &SubmissionId, error: &Error) {
        tracing::error!(submission_id = %id, error = %error, "queue entry failed, continuing with next");
        self.event_tx
            .send(Event::QueueEntryFailed {
                id: id.clone(),
                error: error.to_string(),
            })
            .ok();
        report.failures.push(ItemFailure {
            item: id.to_string(),
            error: error.to_string(),
        });
    }

    /// Returns false when the entry requested nothing
    async fn process_item(&self, item: &QueueItem) -> Result<bool> {
        if item.actions.is_empty() {
            tracing::debug!(submission_id = %item.id, "no actions requested");
            return Ok(false);
        }
        tracing::info!(submission_id = %item.id, "starting processing");

        let mut submission = self
            .store
            .find_submission(&item.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("submission {}", item.id)))?;

        self.ensure_local_file(&mut submission).await?;
        self.processor.process(&mut submission, &item.actions).await?;
        if item.actions.contains(Action::ProcessAnnotator) {
            self.processor.process_annotator(&mut submission).await?;
        }

        Ok(true)
    }

    async fn ensure_local_file(&self, submission: &mut Submission) -> Result<()> {
        if submission.has_local_file() {
            return Ok(());
        }
        let Some(location) = submission.pull_location.clone() else {
            return Ok(());
        };

        tracing::info!(submission_id = %submission.id, url = %location, "local file missing, downloading again");
        let downloaded = self.fetcher.download(&location).await?;
        let path = self
            .repository
            .copy_file(
                &submission.acronym,
                submission.submission_id,
                downloaded.path(),
                &downloaded.filename,
            )
            .await?;
        submission.upload_file_path = Some(path);
        self.store.save_submission(submission).await
    }
}
