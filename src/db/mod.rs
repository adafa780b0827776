//! Database layer for ontology-pull
//!
//! Handles SQLite persistence for datasets, submissions and the durable action queue.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`datasets`] — Tracked dataset CRUD
//! - [`submissions`] — Submission CRUD, validation and the [`MetadataStore`](crate::store::MetadataStore) impl
//! - [`queue`] — Namespaced key/value hash backing the [`QueueStore`](crate::queue::QueueStore) impl

use crate::error::DatabaseError;
use crate::types::{Dataset, OntologyLanguage, StatusSet, Submission, SubmissionId};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod datasets;
mod migrations;
mod queue;
mod submissions;

/// Dataset record from database
#[derive(Debug, Clone, FromRow)]
pub struct DatasetRow {
    /// Unique short identifier
    pub acronym: String,
    /// Display name
    pub name: Option<String>,
    /// Unix timestamp when the dataset was registered
    pub created_at: i64,
}

impl From<DatasetRow> for Dataset {
    fn from(row: DatasetRow) -> Self {
        Dataset {
            acronym: row.acronym,
            name: row.name,
        }
    }
}

/// Submission record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct SubmissionRow {
    /// `<ACRONYM>/submissions/<n>`
    pub id: String,
    /// Owning dataset
    pub acronym: String,
    /// Version number
    pub submission_id: i64,
    /// Language tag (OWL, OBO, SKOS, UMLS)
    pub language: String,
    /// Remote pull location
    pub pull_location: Option<String>,
    /// Local file path
    pub upload_file_path: Option<String>,
    /// RFC 3339 release timestamp
    pub released: String,
    /// RFC 3339 creation timestamp
    pub creation_date: Option<String>,
    /// Version label
    pub version: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Homepage URL
    pub homepage: Option<String>,
    /// Documentation URL
    pub documentation: Option<String>,
    /// JSON array of status flags
    pub statuses: String,
    /// JSON metrics object
    pub metrics: Option<String>,
    /// JSON array of missing imports
    pub missing_imports: Option<String>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = DatabaseError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| {
            DatabaseError::CorruptRecord(format!("{} {}: {}", row.id, what, detail))
        };

        let submission_id = u32::try_from(row.submission_id)
            .map_err(|e| corrupt("submission_id", e.to_string()))?;
        let language: OntologyLanguage = row
            .language
            .parse()
            .map_err(|e: crate::Error| corrupt("language", e.to_string()))?;
        let released = parse_timestamp(&row.released).map_err(|e| corrupt("released", e))?;
        let creation_date = row
            .creation_date
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| corrupt("creation_date", e))?;
        let statuses: StatusSet = serde_json::from_str(&row.statuses)
            .map_err(|e| corrupt("statuses", e.to_string()))?;
        let metrics = row
            .metrics
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt("metrics", e.to_string()))?;
        let missing_imports = row
            .missing_imports
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt("missing_imports", e.to_string()))?;

        Ok(Submission {
            id: SubmissionId::from_raw(row.id.clone()),
            acronym: row.acronym.clone(),
            submission_id,
            language,
            pull_location: row.pull_location.clone(),
            upload_file_path: row.upload_file_path.as_ref().map(PathBuf::from),
            released,
            creation_date,
            version: row.version.clone(),
            description: row.description.clone(),
            homepage: row.homepage.clone(),
            documentation: row.documentation.clone(),
            statuses,
            metrics,
            missing_imports,
        })
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

/// Database handle for ontology-pull
pub struct Database {
    pool: SqlitePool,
}
