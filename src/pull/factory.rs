//! Submission factory: candidate construction, parse gate, persistence

use crate::error::{Error, FieldError, Result};
use crate::parser::{ParseOptions, ParsingOracle};
use crate::queue::ActionQueue;
use crate::repository::FileRepository;
use crate::store::MetadataStore;
use crate::types::{ActionRequest, Dataset, Event, Submission, SubmissionOverrides};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Caller choices for [`SubmissionFactory::create`]
#[derive(Clone, Debug)]
pub struct CreateOptions {
    /// Queue the new submission for every processing action (default: true)
    pub enqueue: bool,
    /// Replace the carried version label
    pub version: Option<String>,
    /// Release timestamp to record instead of now, when re-creating history
    pub released: Option<DateTime<Utc>>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            enqueue: true,
            version: None,
            released: None,
        }
    }
}

/// What became of a candidate submission
#[derive(Clone, Debug)]
pub enum SubmissionOutcome {
    /// Parsed, validated and saved
    Created(Submission),
    /// The parser refused the file; nothing was saved and the file was removed
    Rejected {
        /// The in-memory candidate
        submission: Submission,
        /// Cause reported by the parser
        reason: String,
    },
    /// The store refused the record; nothing was saved and the file was removed
    Invalid {
        /// The in-memory candidate
        submission: Submission,
        /// Field-level validation errors
        errors: Vec<FieldError>,
    },
}

impl SubmissionOutcome {
    /// Whether the submission was saved to the store
    pub fn persisted(&self) -> bool {
        matches!(self, SubmissionOutcome::Created(_))
    }

    /// The candidate record, saved or not
    pub fn submission(&self) -> &Submission {
        match self {
            SubmissionOutcome::Created(submission)
            | SubmissionOutcome::Rejected { submission, .. }
            | SubmissionOutcome::Invalid { submission, .. } => submission,
        }
    }
}

/// Builds the next version of a dataset from a freshly fetched file
#[derive(Clone)]
pub struct SubmissionFactory {
    store: Arc<dyn MetadataStore>,
    repository: FileRepository,
    oracle: Arc<dyn ParsingOracle>,
    queue: ActionQueue,
    parser_timeout: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl SubmissionFactory {
    /// Create a factory
    pub fn new(
        store: Arc<dyn MetadataStore>,
        repository: FileRepository,
        oracle: Arc<dyn ParsingOracle>,
        queue: ActionQueue,
        parser_timeout: Duration,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            store,
            repository,
            oracle,
            queue,
            parser_timeout,
            event_tx,
        }
    }

    /// Create version `next` of `dataset` from `file`
    ///
    /// The file is copied into the repository under the new number and must
    /// clear the parser (reasoner disabled) before the record is saved. The
    /// version folder is reserved exclusively first, so a concurrent producer
    /// that picked the same number gets an invalid outcome and leaves the
    /// folder alone. On rejection or validation failure the reserved folder is
    /// removed and the unsaved candidate is returned inside the outcome.
    ///
    /// # Errors
    ///
    /// Store and filesystem failures propagate; parser and validation failures
    /// do not.
    pub async fn create(
        &self,
        dataset: &Dataset,
        prior: &Submission,
        file: &Path,
        filename: &str,
        options: CreateOptions,
    ) -> Result<SubmissionOutcome> {
        let acronym = dataset.acronym.as_str();
        let submission_id = self.store.next_submission_id(acronym).await?;
        let candidate = Submission::next_version(
            prior,
            SubmissionOverrides {
                submission_id,
                upload_file_path: self.repository.file_path(acronym, submission_id, filename),
                released: options.released.unwrap_or_else(Utc::now),
                version: options.version,
            },
        );

        // Another producer holds this version; its folder is not ours to touch
        let Some(data_folder) = self
            .repository
            .reserve_data_folder(acronym, submission_id)
            .await?
        else {
            let errors = vec![FieldError::new("submission_id", "already exists")];
            return Ok(self.invalid(candidate, errors));
        };

        let result = self.persist(candidate, &data_folder, file, filename).await;
        let created = match result {
            Ok(SubmissionOutcome::Created(created)) => created,
            Ok(outcome) => {
                self.repository.remove_data_folder(&data_folder).await?;
                return Ok(outcome);
            }
            Err(e) => {
                self.repository.remove_data_folder(&data_folder).await?;
                return Err(e);
            }
        };

        if options.enqueue {
            match self.queue.enqueue(&created.id, ActionRequest::All).await {
                Ok(_) => tracing::info!(
                    acronym,
                    submission_id,
                    "created a new submission and queued it for processing"
                ),
                Err(e) => tracing::error!(
                    acronym,
                    submission_id,
                    error = %e,
                    "submission saved but could not be queued"
                ),
            }
        } else {
            tracing::info!(acronym, submission_id, "created a new submission");
        }

        self.event_tx
            .send(Event::SubmissionCreated {
                id: created.id.clone(),
            })
            .ok();

        Ok(SubmissionOutcome::Created(created))
    }

    /// Copy, parse-check and save a candidate whose folder this call reserved
    async fn persist(
        &self,
        candidate: Submission,
        data_folder: &Path,
        file: &Path,
        filename: &str,
    ) -> Result<SubmissionOutcome> {
        let acronym = candidate.acronym.as_str();
        let submission_id = candidate.submission_id;
        let upload_file_path = self
            .repository
            .copy_file(acronym, submission_id, file, filename)
            .await?;

        if let Err(e) = self.check_parsable(&upload_file_path, data_folder).await {
            tracing::error!(
                acronym,
                submission_id,
                error = %e,
                "new file did not clear the parser, no submission created"
            );
            self.event_tx
                .send(Event::SubmissionRejected {
                    acronym: acronym.to_string(),
                    reason: e.to_string(),
                })
                .ok();
            return Ok(SubmissionOutcome::Rejected {
                submission: candidate,
                reason: e.to_string(),
            });
        }

        match self.store.create_submission(&candidate).await {
            Ok(created) => Ok(SubmissionOutcome::Created(created)),
            Err(Error::Validation(errors)) => Ok(self.invalid(candidate, errors)),
            Err(e) => Err(e),
        }
    }

    fn invalid(&self, candidate: Submission, errors: Vec<FieldError>) -> SubmissionOutcome {
        let rendered = Error::Validation(errors.clone()).to_string();
        tracing::error!(
            acronym = %candidate.acronym,
            submission_id = candidate.submission_id,
            errors = %rendered,
            "unable to create submission"
        );
        self.event_tx
            .send(Event::SubmissionRejected {
                acronym: candidate.acronym.clone(),
                reason: rendered,
            })
            .ok();
        SubmissionOutcome::Invalid {
            submission: candidate,
            errors,
        }
    }

    async fn check_parsable(&self, file: &Path, output_dir: &Path) -> Result<()> {
        tokio::time::timeout(
            self.parser_timeout,
            self.oracle
                .parse(file, output_dir, ParseOptions { reasoner: false }),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("parsing {}", file.display()),
            seconds: self.parser_timeout.as_secs(),
        })??;
        Ok(())
    }
}
