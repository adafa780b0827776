//! Submission CRUD, store-level validation and the metadata store implementation.

use crate::error::{DatabaseError, FieldError};
use crate::store::MetadataStore;
use crate::types::{Dataset, Submission, SubmissionId};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, SubmissionRow, format_timestamp};

const SUBMISSION_COLUMNS: &str = r#"
    id, acronym, submission_id, language, pull_location, upload_file_path,
    released, creation_date, version, description, homepage, documentation,
    statuses, metrics, missing_imports
"#;

impl Database {
    /// Get a submission by identifier
    pub async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get submission {}: {}",
                id, e
            )))
        })?;

        Ok(row.map(Submission::try_from).transpose()?)
    }

    /// Get the highest-numbered submission of a dataset
    pub async fn get_latest_submission(&self, acronym: &str) -> Result<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions
             WHERE acronym = ?
             ORDER BY submission_id DESC
             LIMIT 1"
        ))
        .bind(acronym)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get latest submission of {}: {}",
                acronym, e
            )))
        })?;

        Ok(row.map(Submission::try_from).transpose()?)
    }

    /// List every submission of a dataset, oldest first
    pub async fn list_submissions(&self, acronym: &str) -> Result<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions
             WHERE acronym = ?
             ORDER BY submission_id ASC"
        ))
        .bind(acronym)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list submissions of {}: {}",
                acronym, e
            )))
        })?;

        rows.into_iter()
            .map(|row| Submission::try_from(row).map_err(Error::from))
            .collect()
    }

    /// Compute the number the next submission of `acronym` takes
    pub async fn get_next_submission_id(&self, acronym: &str) -> Result<u32> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(submission_id) FROM submissions WHERE acronym = ?")
                .bind(acronym)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to compute next submission id for {}: {}",
                        acronym, e
                    )))
                })?;

        let next = max.unwrap_or(0) + 1;
        u32::try_from(next).map_err(|_| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "submission ids of {} overflowed: {}",
                acronym, next
            )))
        })
    }

    /// Check a candidate submission before it is inserted
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub async fn validate_new_submission(&self, submission: &Submission) -> Result<Vec<FieldError>> {
        let mut errors = Vec::new();

        if submission.submission_id == 0 {
            errors.push(FieldError::new("submission_id", "must be positive"));
        }
        if submission.id != SubmissionId::new(&submission.acronym, submission.submission_id) {
            errors.push(FieldError::new(
                "id",
                "does not match acronym and submission_id",
            ));
        }
        match &submission.upload_file_path {
            None => errors.push(FieldError::new("upload_file_path", "is required")),
            Some(path) if !path.is_file() => errors.push(FieldError::new(
                "upload_file_path",
                format!("{} does not exist", path.display()),
            )),
            Some(_) => {}
        }
        if let Some(location) = &submission.pull_location
            && let Err(e) = url::Url::parse(location)
        {
            errors.push(FieldError::new(
                "pull_location",
                format!("is not a valid URL: {e}"),
            ));
        }
        if !self.dataset_exists(&submission.acronym).await? {
            errors.push(FieldError::new("acronym", "unknown dataset"));
        } else if self.get_submission(&submission.id).await?.is_some() {
            errors.push(FieldError::new("submission_id", "already exists"));
        }

        Ok(errors)
    }

    /// Validate and insert a new submission, stamping its creation date
    pub async fn insert_submission(&self, submission: &Submission) -> Result<Submission> {
        let errors = self.validate_new_submission(submission).await?;
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let mut created = submission.clone();
        created.creation_date = Some(chrono::Utc::now());

        let result = self.bind_submission(
            sqlx::query(
                r#"
                INSERT INTO submissions (
                    id, acronym, submission_id, language, pull_location, upload_file_path,
                    released, creation_date, version, description, homepage, documentation,
                    statuses, metrics, missing_imports
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            ),
            &created,
        )?
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::Validation(vec![FieldError::new(
                    "submission_id",
                    "already exists",
                )]))
            }
            Err(e) => Err(Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert submission {}: {}",
                created.id, e
            )))),
        }
    }

    /// Overwrite the mutable state of an existing submission
    pub async fn update_submission(&self, submission: &Submission) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE submissions SET
                language = ?, pull_location = ?, upload_file_path = ?, released = ?,
                version = ?, description = ?, homepage = ?, documentation = ?,
                statuses = ?, metrics = ?, missing_imports = ?
            WHERE id = ?
            "#,
        )
        .bind(submission.language.as_str())
        .bind(&submission.pull_location)
        .bind(
            submission
                .upload_file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(format_timestamp(&submission.released))
        .bind(&submission.version)
        .bind(&submission.description)
        .bind(&submission.homepage)
        .bind(&submission.documentation)
        .bind(serde_json::to_string(&submission.statuses)?)
        .bind(
            submission
                .metrics
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            submission
                .missing_imports
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(submission.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update submission {}: {}",
                submission.id, e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("submission {}", submission.id)));
        }

        Ok(())
    }

    fn bind_submission<'q>(
        &self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        submission: &Submission,
    ) -> Result<sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>> {
        Ok(query
            .bind(submission.id.as_str().to_string())
            .bind(submission.acronym.clone())
            .bind(i64::from(submission.submission_id))
            .bind(submission.language.as_str())
            .bind(submission.pull_location.clone())
            .bind(
                submission
                    .upload_file_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )
            .bind(format_timestamp(&submission.released))
            .bind(submission.creation_date.as_ref().map(format_timestamp))
            .bind(submission.version.clone())
            .bind(submission.description.clone())
            .bind(submission.homepage.clone())
            .bind(submission.documentation.clone())
            .bind(serde_json::to_string(&submission.statuses)?)
            .bind(
                submission
                    .metrics
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            )
            .bind(
                submission
                    .missing_imports
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ))
    }
}

#[async_trait]
impl MetadataStore for Database {
    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        self.get_all_datasets().await
    }

    async fn latest_submission(&self, acronym: &str) -> Result<Option<Submission>> {
        self.get_latest_submission(acronym).await
    }

    async fn find_submission(&self, id: &SubmissionId) -> Result<Option<Submission>> {
        self.get_submission(id).await
    }

    async fn next_submission_id(&self, acronym: &str) -> Result<u32> {
        self.get_next_submission_id(acronym).await
    }

    async fn create_submission(&self, submission: &Submission) -> Result<Submission> {
        self.insert_submission(submission).await
    }

    async fn save_submission(&self, submission: &Submission) -> Result<()> {
        self.update_submission(submission).await
    }
}
