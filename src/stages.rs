//! Search indexing and metrics collaborators
//!
//! Both stages run after a successful structural parse. The no-op
//! implementations report [`Error::NotSupported`] so the processor can skip the
//! stage with a warning instead of flagging the submission.

use crate::error::{Error, Result};
use crate::types::{Metrics, Submission};
use async_trait::async_trait;

/// Builds the full-text index for a submission
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Index the parsed content of `submission`
    async fn index(&self, submission: &Submission) -> Result<()>;
}

/// Computes statistics over a parsed submission
#[async_trait]
pub trait MetricsCalculator: Send + Sync {
    /// Compute metrics for `submission`
    async fn compute(&self, submission: &Submission) -> Result<Metrics>;
}

/// Indexer used when no search backend is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpSearchIndexer;

#[async_trait]
impl SearchIndexer for NoOpSearchIndexer {
    async fn index(&self, _submission: &Submission) -> Result<()> {
        Err(Error::NotSupported(
            "search indexing is not configured".to_string(),
        ))
    }
}

/// Metrics calculator used when none is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetricsCalculator;

#[async_trait]
impl MetricsCalculator for NoOpMetricsCalculator {
    async fn compute(&self, _submission: &Submission) -> Result<Metrics> {
        Err(Error::NotSupported(
            "metrics calculation is not configured".to_string(),
        ))
    }
}
