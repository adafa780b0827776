//! Notification sinks
//!
//! The pull scheduler tells a [`NotificationSink`] when a dataset's pull
//! location no longer serves anything. Delivery failures are logged by the
//! caller and never fail the dataset.

use crate::config::WebhookConfig;
use crate::error::{Error, Result};
use crate::types::Submission;
use async_trait::async_trait;
use serde::Serialize;

/// Receives "remote file missing" notices
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `submission` is the latest submission of the affected dataset
    async fn remote_file_missing(&self, submission: &Submission) -> Result<()>;
}

/// Writes notices to the tracing subscriber
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn remote_file_missing(&self, submission: &Submission) -> Result<()> {
        tracing::warn!(
            acronym = %submission.acronym,
            submission_id = %submission.id,
            pull_location = submission.pull_location.as_deref().unwrap_or(""),
            "remote ontology file is missing"
        );
        Ok(())
    }
}

/// Payload POSTed to webhooks
#[derive(Clone, Debug, Serialize)]
pub struct RemoteMissingPayload {
    /// Always `remote_file_missing`
    pub event: String,
    /// Affected dataset
    pub acronym: String,
    /// Latest submission of the dataset
    pub submission_id: String,
    /// Location that returned nothing
    pub pull_location: Option<String>,
    /// Unix timestamp of the check
    pub timestamp: i64,
}

/// POSTs notices to every configured webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhooks: Vec<WebhookConfig>,
}

impl WebhookNotifier {
    /// Create a notifier for `webhooks`
    pub fn new(webhooks: Vec<WebhookConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhooks,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn remote_file_missing(&self, submission: &Submission) -> Result<()> {
        let payload = RemoteMissingPayload {
            event: "remote_file_missing".to_string(),
            acronym: submission.acronym.clone(),
            submission_id: submission.id.to_string(),
            pull_location: submission.pull_location.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        let mut failures = Vec::new();
        for webhook in &self.webhooks {
            let mut request = self
                .client
                .post(&webhook.url)
                .json(&payload)
                .timeout(webhook.timeout);
            if let Some(auth) = &webhook.auth_header {
                request = request.header("Authorization", auth);
            }

            match tokio::time::timeout(webhook.timeout, request.send()).await {
                Ok(Ok(response)) if response.status().is_success() => {
                    tracing::debug!(url = %webhook.url, "webhook sent successfully");
                }
                Ok(Ok(response)) => {
                    let status = response.status();
                    tracing::warn!(url = %webhook.url, status = %status, "webhook failed");
                    failures.push(format!("{} returned {}", webhook.url, status));
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %webhook.url, error = %e, "webhook failed");
                    failures.push(format!("{}: {}", webhook.url, e));
                }
                Err(_) => {
                    tracing::warn!(url = %webhook.url, "webhook timeout");
                    failures.push(format!(
                        "{} timed out after {:?}",
                        webhook.url, webhook.timeout
                    ));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "webhook delivery failed: {}",
                failures.join("; ")
            )))
        }
    }
}
