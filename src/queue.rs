//! Durable action queue
//!
//! The queue maps a submission identifier to the set of processing actions
//! requested for it. Entries live in a namespaced key/value hash behind
//! [`QueueStore`] so any process sharing the store can produce work, and a
//! consumer can claim entries one key at a time.
//!
//! Writing an entry for an identifier that is already queued replaces its
//! action set; the latest request wins.

use crate::config::{ClaimMode, QueueConfig};
use crate::error::Result;
use crate::types::{ActionRequest, ActionSet, SubmissionId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A namespaced key/value hash shared across processes
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Write or overwrite `key` in the hash named `holder`
    async fn set(&self, holder: &str, key: &str, value: &str) -> Result<()>;

    /// Every `(key, value)` pair currently in `holder`
    async fn get_all(&self, holder: &str) -> Result<Vec<(String, String)>>;

    /// Delete `key`, returning true only if this call removed it
    ///
    /// This is the claim primitive: of several concurrent callers at most one
    /// sees `true`.
    async fn delete(&self, holder: &str, key: &str) -> Result<bool>;

    /// Delete `key` only if it still holds `value`
    async fn delete_if_value(&self, holder: &str, key: &str, value: &str) -> Result<bool>;
}

/// In-process [`QueueStore`] for tests and single-process embedding
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    hashes: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryQueueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn set(&self, holder: &str, key: &str, value: &str) -> Result<()> {
        self.hashes
            .lock()
            .await
            .entry(holder.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_all(&self, holder: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .hashes
            .lock()
            .await
            .get(holder)
            .map(|hash| hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, holder: &str, key: &str) -> Result<bool> {
        Ok(self
            .hashes
            .lock()
            .await
            .get_mut(holder)
            .is_some_and(|hash| hash.remove(key).is_some()))
    }

    async fn delete_if_value(&self, holder: &str, key: &str, value: &str) -> Result<bool> {
        let mut hashes = self.hashes.lock().await;
        let Some(hash) = hashes.get_mut(holder) else {
            return Ok(false);
        };
        if hash.get(key).map(String::as_str) == Some(value) {
            hash.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

/// One queue entry as read from the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueItem {
    /// Submission the actions apply to
    pub id: SubmissionId,
    /// Namespaced store key
    pub key: String,
    /// Stored value, kept for compare-and-delete
    pub raw_value: String,
    /// Decoded action set (unknown names already dropped)
    pub actions: ActionSet,
}

/// Producer and consumer handle on the durable queue
#[derive(Clone)]
pub struct ActionQueue {
    store: Arc<dyn QueueStore>,
    config: QueueConfig,
}

impl ActionQueue {
    /// Create a queue over `store` using the namespace in `config`
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Claim semantics consumers of this queue should use
    pub fn claim_mode(&self) -> ClaimMode {
        self.config.claim_mode
    }

    fn key_for(&self, id: &SubmissionId) -> String {
        format!("{}{}", self.config.id_prefix, id)
    }

    /// Request `request` for submission `id`
    ///
    /// [`ActionRequest::All`] expands to every known action. An existing entry
    /// for `id` is overwritten, not merged. When the resolved set is empty
    /// nothing is written and `false` is returned.
    pub async fn enqueue(
        &self,
        id: &SubmissionId,
        request: impl Into<ActionRequest>,
    ) -> Result<bool> {
        let actions = request.into().resolve();
        if actions.is_empty() {
            tracing::debug!(submission_id = %id, "empty action set, nothing queued");
            return Ok(false);
        }

        let value = serde_json::to_string(&actions)?;
        self.store
            .set(&self.config.holder, &self.key_for(id), &value)
            .await?;

        tracing::info!(submission_id = %id, actions = %value, "submission queued");
        Ok(true)
    }

    /// Read every well-formed entry without removing anything
    ///
    /// Entries whose key lacks the namespace prefix or whose value is not a
    /// JSON map are logged and left in place.
    pub async fn queued_items(&self) -> Result<Vec<QueueItem>> {
        let entries = self.store.get_all(&self.config.holder).await?;
        let mut items = Vec::with_capacity(entries.len());

        for (key, raw_value) in entries {
            let Some(id) = key.strip_prefix(&self.config.id_prefix) else {
                tracing::warn!(key = %key, "queue key outside namespace, skipping");
                continue;
            };
            match ActionRequest::from_json(&raw_value) {
                Ok(request) => items.push(QueueItem {
                    id: SubmissionId::from_raw(id),
                    key: key.clone(),
                    raw_value,
                    actions: request.resolve(),
                }),
                Err(e) => {
                    tracing::error!(key = %key, value = %raw_value, error = %e, "malformed queue entry, skipping");
                }
            }
        }

        Ok(items)
    }

    /// Atomically remove `item`; false means another consumer claimed it first
    pub async fn claim(&self, item: &QueueItem) -> Result<bool> {
        self.store.delete(&self.config.holder, &item.key).await
    }

    /// Remove `item` once handled, unless it was re-enqueued in the meantime
    pub async fn acknowledge(&self, item: &QueueItem) -> Result<bool> {
        self.store
            .delete_if_value(&self.config.holder, &item.key, &item.raw_value)
            .await
    }

    /// Read and remove every queued entry as one batch
    ///
    /// Only entries this call actually claimed are returned. An entry whose
    /// claim fails is still in the store and is left for the next drain.
    pub async fn drain_all(&self) -> Result<Vec<QueueItem>> {
        let mut claimed = Vec::new();
        for item in self.queued_items().await? {
            match self.claim(&item).await {
                Ok(true) => claimed.push(item),
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        submission_id = %item.id,
                        error = %e,
                        "failed to claim queue entry, left for next drain"
                    );
                }
            }
        }
        Ok(claimed)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Action;

    fn queue() -> (Arc<MemoryQueueStore>, ActionQueue) {
        let store = Arc::new(MemoryQueueStore::new());
        let queue = ActionQueue::new(store.clone(), QueueConfig::default());
        (store, queue)
    }

    #[tokio::test]
    async fn all_sentinel_expands_and_drain_is_destructive() {
        let (_, queue) = queue();
        let id = SubmissionId::from_raw("X");

        queue.enqueue(&id, ActionRequest::All).await.unwrap();

        let batch = queue.drain_all().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
        assert_eq!(batch[0].actions, ActionSet::all());
        assert_eq!(
            batch[0].raw_value,
            r#"{"process_rdf":true,"index_search":true,"run_metrics":true,"process_annotator":true}"#
        );

        assert!(queue.drain_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_enqueue_overwrites_instead_of_merging() {
        // Latest request wins; earlier stages are dropped
        let (_, queue) = queue();
        let id = SubmissionId::new("ABC", 4);

        queue
            .enqueue(&id, [Action::ProcessRdf, Action::IndexSearch].into_iter().collect::<ActionSet>())
            .await
            .unwrap();
        queue
            .enqueue(&id, [Action::RunMetrics].into_iter().collect::<ActionSet>())
            .await
            .unwrap();

        let items = queue.queued_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].actions,
            [Action::RunMetrics].into_iter().collect::<ActionSet>()
        );
    }

    #[tokio::test]
    async fn empty_action_set_is_never_stored() {
        let (store, queue) = queue();
        let id = SubmissionId::new("ABC", 1);

        let request = ActionRequest::from_json(r#"{"rebuild_world": true, "run_metrics": false}"#)
            .unwrap();
        let written = queue.enqueue(&id, request).await.unwrap();

        assert!(!written);
        assert!(store.get_all("parseQueue").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_are_namespaced_with_prefix() {
        let (store, queue) = queue();
        queue
            .enqueue(&SubmissionId::new("ABC", 2), ActionRequest::All)
            .await
            .unwrap();

        let entries = store.get_all("parseQueue").await.unwrap();
        assert_eq!(entries[0].0, "sub:ABC/submissions/2");
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped_and_left_in_place() {
        let (store, queue) = queue();
        store.set("parseQueue", "sub:BAD/submissions/1", "not json").await.unwrap();
        store.set("parseQueue", "other:thing", "{}").await.unwrap();
        queue
            .enqueue(&SubmissionId::new("OK", 1), ActionRequest::All)
            .await
            .unwrap();

        let batch = queue.drain_all().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id.as_str(), "OK/submissions/1");

        let remaining = store.get_all("parseQueue").await.unwrap();
        assert_eq!(remaining.len(), 2, "malformed entries stay for operators");
    }

    #[tokio::test]
    async fn claim_succeeds_only_once() {
        let (_, queue) = queue();
        queue
            .enqueue(&SubmissionId::new("ABC", 1), ActionRequest::All)
            .await
            .unwrap();

        let item = queue.queued_items().await.unwrap().remove(0);
        assert!(queue.claim(&item).await.unwrap());
        assert!(!queue.claim(&item).await.unwrap());
    }

    #[tokio::test]
    async fn acknowledge_keeps_entries_re_enqueued_during_processing() {
        let (_, queue) = queue();
        let id = SubmissionId::new("ABC", 1);
        queue.enqueue(&id, ActionRequest::All).await.unwrap();

        let item = queue.queued_items().await.unwrap().remove(0);
        queue
            .enqueue(&id, [Action::RunMetrics].into_iter().collect::<ActionSet>())
            .await
            .unwrap();

        assert!(!queue.acknowledge(&item).await.unwrap());
        let remaining = queue.queued_items().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].actions.contains(Action::RunMetrics));
    }

    #[tokio::test]
    async fn stored_all_sentinel_from_foreign_producer_is_expanded() {
        let (store, queue) = queue();
        store
            .set("parseQueue", "sub:EXT/submissions/9", r#"{"all":true}"#)
            .await
            .unwrap();

        let items = queue.queued_items().await.unwrap();
        assert_eq!(items[0].actions, ActionSet::all());
    }

    /// Memory store whose delete fails for one key
    struct FailingDeleteStore {
        inner: MemoryQueueStore,
        failing_key: String,
    }

    #[async_trait]
    impl QueueStore for FailingDeleteStore {
        async fn set(&self, holder: &str, key: &str, value: &str) -> Result<()> {
            self.inner.set(holder, key, value).await
        }

        async fn get_all(&self, holder: &str) -> Result<Vec<(String, String)>> {
            self.inner.get_all(holder).await
        }

        async fn delete(&self, holder: &str, key: &str) -> Result<bool> {
            if key == self.failing_key {
                return Err(Error::Other("connection reset".to_string()));
            }
            self.inner.delete(holder, key).await
        }

        async fn delete_if_value(&self, holder: &str, key: &str, value: &str) -> Result<bool> {
            self.inner.delete_if_value(holder, key, value).await
        }
    }

    #[tokio::test]
    async fn drain_keeps_claimed_entries_when_one_claim_fails() {
        let store = Arc::new(FailingDeleteStore {
            inner: MemoryQueueStore::new(),
            failing_key: "sub:B/submissions/1".to_string(),
        });
        let queue = ActionQueue::new(store.clone(), QueueConfig::default());
        queue
            .enqueue(&SubmissionId::new("A", 1), ActionRequest::All)
            .await
            .unwrap();
        queue
            .enqueue(&SubmissionId::new("B", 1), ActionRequest::All)
            .await
            .unwrap();

        let batch = queue.drain_all().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, SubmissionId::new("A", 1));

        let remaining = store.get_all("parseQueue").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, "sub:B/submissions/1");
    }
}
