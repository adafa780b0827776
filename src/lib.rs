//! # ontology-pull
//!
//! Periodic pull of tracked ontologies from their remote locations, with
//! change detection, versioned submission creation and a durable action
//! queue that hands new submissions to a processing pipeline.
//!
//! ## Design Philosophy
//!
//! ontology-pull is designed to be:
//! - **Library-first** - No CLI or cron wiring, callers invoke the entry points
//! - **Failure-contained** - One dataset or queue entry failing never stops the batch
//! - **Pluggable** - Parser, indexer, metrics, annotator and notifier sit behind traits
//! - **Event-driven** - Consumers can subscribe to events instead of scraping logs
//!
//! ## Quick Start
//!
//! ```no_run
//! use ontology_pull::{
//!     ActionQueue, CliParsingOracle, Config, Database, OntologyPull, QueueConsumer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let queue = ActionQueue::new(db.clone(), config.queue.clone());
//!
//!     let oracle = Arc::new(
//!         CliParsingOracle::from_config(&config.parser).ok_or("ontology parser not found")?,
//!     );
//!
//!     let pull = OntologyPull::new(config.clone(), db.clone(), queue.clone(), oracle.clone())?;
//!     let report = pull.run(false).await?;
//!     println!("created {} submissions", report.created.len());
//!
//!     let consumer = QueueConsumer::new(config, db, queue, oracle)?;
//!     let processed = consumer.process_all().await?;
//!     println!("processed {} submissions", processed.processed.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Annotator collaborator
pub mod annotator;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Content digests and change detection
pub mod digest;
/// Error types
pub mod error;
/// Remote content fetching
pub mod fetcher;
/// Per-item failure isolation
pub mod isolation;
/// Notification sinks
pub mod notify;
/// Parsing oracle
pub mod parser;
/// Queue consumer and per-submission processing
pub mod processing;
/// Pull scheduler and submission factory
pub mod pull;
/// Durable action queue
pub mod queue;
/// Versioned file repository
pub mod repository;
/// Retry logic with exponential backoff
pub mod retry;
/// Search indexing and metrics collaborators
pub mod stages;
/// Metadata store abstraction
pub mod store;
/// Core types and events
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ClaimMode, Config, PullConfig, QueueConfig};
pub use db::Database;
pub use error::{Error, FieldError, Result};
pub use fetcher::{ContentFetcher, DownloadedFile, HttpFetcher};
pub use notify::{LogNotifier, NotificationSink, WebhookNotifier};
pub use parser::{CliParsingOracle, ParseOptions, ParseReport, ParsingOracle};
pub use processing::{ProcessReport, QueueConsumer, SubmissionProcessor};
pub use pull::{
    CreateOptions, OntologyPull, PullReport, SkipReason, SubmissionFactory, SubmissionOutcome,
};
pub use queue::{ActionQueue, MemoryQueueStore, QueueItem, QueueStore};
pub use repository::FileRepository;
pub use store::MetadataStore;
pub use types::{
    Action, ActionRequest, ActionSet, Dataset, Event, ItemFailure, Metrics, OntologyLanguage,
    StatusCode, StatusFlag, StatusSet, Submission, SubmissionId,
};
