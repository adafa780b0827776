//! Metadata store abstraction
//!
//! Datasets and submissions are owned by a metadata store. The pull scheduler
//! and the queue consumer only see it through [`MetadataStore`], which
//! [`Database`](crate::db::Database) implements on SQLite.

use crate::error::Result;
use crate::types::{Dataset, Submission, SubmissionId};
use async_trait::async_trait;

/// Read/write access to dataset and submission records
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// All tracked datasets, in no particular order
    async fn list_datasets(&self) -> Result<Vec<Dataset>>;

    /// The highest-numbered submission of `acronym`, whatever its status
    async fn latest_submission(&self, acronym: &str) -> Result<Option<Submission>>;

    /// Look up a submission by identifier
    async fn find_submission(&self, id: &SubmissionId) -> Result<Option<Submission>>;

    /// The number the next submission of `acronym` should take
    async fn next_submission_id(&self, acronym: &str) -> Result<u32>;

    /// Validate and persist a new submission
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`](crate::Error::Validation) with field-level
    /// messages when the record is not acceptable; nothing is written in that case.
    async fn create_submission(&self, submission: &Submission) -> Result<Submission>;

    /// Persist changes to an existing submission
    async fn save_submission(&self, submission: &Submission) -> Result<()>;
}
