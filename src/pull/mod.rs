//! Pull scheduler and submission factory
//!
//! [`OntologyPull::run`] walks every tracked dataset in case-insensitive
//! acronym order. For each one it looks at the latest submission, decides
//! whether the dataset is eligible, fetches the pull location and creates a
//! new submission through [`SubmissionFactory`] when the content changed.
//!
//! Each dataset is an isolated unit of work: an error or panic while handling
//! one is logged, recorded in [`PullReport::failures`] and the scan continues.

mod factory;

pub use factory::{CreateOptions, SubmissionFactory, SubmissionOutcome};

use crate::config::Config;
use crate::digest::{ContentChange, detect_change};
use crate::error::Result;
use crate::fetcher::{ContentFetcher, HttpFetcher};
use crate::isolation::run_isolated;
use crate::notify::{LogNotifier, NotificationSink, WebhookNotifier};
use crate::parser::ParsingOracle;
use crate::queue::ActionQueue;
use crate::repository::FileRepository;
use crate::store::MetadataStore;
use crate::types::{Dataset, Event, ItemFailure, Submission};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Instrument;

/// Why a dataset produced no submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The dataset has no submission at all
    NoSubmission,
    /// Restricted content and restricted auto-pull is disabled
    RestrictedContent,
    /// The latest submission records no pull location
    NoPullLocation,
    /// Excluded by the long/short partition for this run
    LongRunPartition,
    /// The remote file matches the stored one
    Unchanged,
    /// Nothing exists at the pull location
    RemoteMissing,
    /// New content was rejected by the parser or by validation
    NotCreated,
}

/// Outcome of one pull run
#[derive(Clone, Debug, Default)]
pub struct PullReport {
    /// Submissions that were saved during this run
    pub created: Vec<Submission>,
    /// Datasets that were passed over, with the reason
    pub skipped: Vec<(String, SkipReason)>,
    /// Datasets whose handling failed
    pub failures: Vec<ItemFailure>,
}

impl PullReport {
    /// Only the newly created submissions
    pub fn into_submissions(self) -> Vec<Submission> {
        self.created
    }
}

enum DatasetOutcome {
    Created(Submission),
    Skipped(SkipReason),
}

/// Periodic remote pull of tracked datasets
pub struct OntologyPull {
    config: Arc<Config>,
    store: Arc<dyn MetadataStore>,
    fetcher: Arc<dyn ContentFetcher>,
    notifier: Arc<dyn NotificationSink>,
    factory: SubmissionFactory,
    event_tx: broadcast::Sender<Event>,
}

impl OntologyPull {
    /// Create a scheduler with the HTTP fetcher and the notifier implied by `config`
    ///
    /// Webhooks are used when any are configured, otherwise notices go to the log.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn MetadataStore>,
        queue: ActionQueue,
        oracle: Arc<dyn ParsingOracle>,
    ) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch.clone(), config.storage.temp_dir.clone())?;
        let notifier: Arc<dyn NotificationSink> = if config.notifications.webhooks.is_empty() {
            Arc::new(LogNotifier)
        } else {
            Arc::new(WebhookNotifier::new(config.notifications.webhooks.clone()))
        };
        let (event_tx, _rx) = broadcast::channel(1000);
        let factory = SubmissionFactory::new(
            store.clone(),
            FileRepository::new(config.storage.repository_dir.clone()),
            oracle,
            queue,
            config.parser.timeout,
            event_tx.clone(),
        );

        Ok(Self {
            config,
            store,
            fetcher: Arc::new(fetcher),
            notifier,
            factory,
            event_tx,
        })
    }

    /// Replace the content fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Subscribe to pull events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The factory used for new submissions
    pub fn factory(&self) -> &SubmissionFactory {
        &self.factory
    }

    /// Scan every eligible dataset once
    ///
    /// `long_run_mode` selects which side of the long-dataset partition runs.
    ///
    /// # Errors
    ///
    /// Only a failure to list datasets is returned; per-dataset failures are
    /// recorded in the report.
    pub async fn run(&self, long_run_mode: bool) -> Result<PullReport> {
        let span = tracing::info_span!("ontology_pull", long_run_mode);
        self.run_inner(long_run_mode).instrument(span).await
    }

    async fn run_inner(&self, long_run_mode: bool) -> Result<PullReport> {
        tracing::info!(
            restricted_auto_pull = self.config.pull.enable_restricted_auto_pull,
            long_run_mode,
            "starting remote ontology pull"
        );
        self.event_tx.send(Event::PullStarted { long_run_mode }).ok();

        let mut datasets = self.store.list_datasets().await?;
        if let Some(only) = &self.config.pull.restrict_to_dataset_ids {
            datasets.retain(|d| only.contains(&d.acronym));
        }
        datasets.sort_by_key(Dataset::sort_key);

        let mut report = PullReport::default();
        for dataset in &datasets {
            let span = tracing::info_span!("dataset", acronym = %dataset.acronym);
            let result = run_isolated(
                &dataset.acronym,
                self.pull_dataset(dataset, long_run_mode),
            )
            .instrument(span)
            .await;

            match result {
                Ok(DatasetOutcome::Created(submission)) => report.created.push(submission),
                Ok(DatasetOutcome::Skipped(reason)) => {
                    tracing::debug!(acronym = %dataset.acronym, reason = ?reason, "dataset skipped");
                    report.skipped.push((dataset.acronym.clone(), reason));
                }
                Err(e) => {
                    tracing::error!(
                        acronym = %dataset.acronym,
                        error = %e,
                        "problem retrieving dataset, continuing with next"
                    );
                    report.failures.push(ItemFailure {
                        item: dataset.acronym.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            datasets = datasets.len(),
            created = report.created.len(),
            failures = report.failures.len(),
            "remote ontology pull finished"
        );
        Ok(report)
    }

    async fn pull_dataset(&self, dataset: &Dataset, long_run_mode: bool) -> Result<DatasetOutcome> {
        let acronym = dataset.acronym.as_str();
        let pull = &self.config.pull;

        let Some(mut latest) = self.store.latest_submission(acronym).await? else {
            return Ok(DatasetOutcome::Skipped(SkipReason::NoSubmission));
        };
        if latest.language.is_restricted() && !pull.enable_restricted_auto_pull {
            return Ok(DatasetOutcome::Skipped(SkipReason::RestrictedContent));
        }
        let Some(mut location) = latest.pull_location.clone() else {
            return Ok(DatasetOutcome::Skipped(SkipReason::NoPullLocation));
        };
        if let Some(long) = &pull.long_dataset_allow_list
            && long.contains(acronym) != long_run_mode
        {
            return Ok(DatasetOutcome::Skipped(SkipReason::LongRunPartition));
        }

        if latest.language.is_restricted()
            && let Some(base) = &pull.alternate_base_url
        {
            location = alternate_location(base, &location);
            tracing::info!(url = %location, "using alternative download for restricted content");
            latest.pull_location = Some(location.clone());
        }

        if !self.fetcher.remote_file_exists(&location).await? {
            tracing::info!(url = %location, "no submission file at pull location");
            self.event_tx
                .send(Event::RemoteFileMissing {
                    acronym: acronym.to_string(),
                    url: location.clone(),
                })
                .ok();
            if let Err(e) = self.notifier.remote_file_missing(&latest).await {
                tracing::warn!(error = %e, "failed to send remote file missing notice");
            }
            return Ok(DatasetOutcome::Skipped(SkipReason::RemoteMissing));
        }

        tracing::info!(url = %location, "checking download");
        let downloaded = self.fetcher.download(&location).await?;
        let change = detect_change(downloaded.path(), latest.upload_file_path.as_deref()).await?;

        match &change {
            ContentChange::Unchanged { digest } => {
                tracing::debug!(digest = %digest, "remote file unchanged");
            }
            ContentChange::New { digest } => {
                tracing::info!(new = %digest, "new file found, no previous file");
            }
            ContentChange::Changed { previous, current } => {
                tracing::info!(old = %previous, new = %current, "new file found");
            }
        }
        if !change.is_new_content() {
            return Ok(DatasetOutcome::Skipped(SkipReason::Unchanged));
        }

        let outcome = self
            .factory
            .create(
                dataset,
                &latest,
                downloaded.path(),
                &downloaded.filename,
                CreateOptions::default(),
            )
            .await?;

        Ok(match outcome {
            SubmissionOutcome::Created(submission) => DatasetOutcome::Created(submission),
            SubmissionOutcome::Rejected { .. } | SubmissionOutcome::Invalid { .. } => {
                DatasetOutcome::Skipped(SkipReason::NotCreated)
            }
        })
    }
}

/// `base` followed by the last path segment of `location`
fn alternate_location(base: &str, location: &str) -> String {
    let basename = location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    format!("{}{}", base, basename)
}
