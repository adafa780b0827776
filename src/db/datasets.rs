//! Tracked dataset CRUD operations.

use crate::error::DatabaseError;
use crate::types::Dataset;
use crate::{Error, Result};

use super::{Database, DatasetRow};

impl Database {
    /// Register a dataset, updating its name if it already exists
    pub async fn insert_dataset(&self, dataset: &Dataset) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO datasets (acronym, name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(acronym) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&dataset.acronym)
        .bind(&dataset.name)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert dataset {}: {}",
                dataset.acronym, e
            )))
        })?;

        Ok(())
    }

    /// Get all datasets, ordered by acronym as stored
    pub async fn get_all_datasets(&self) -> Result<Vec<Dataset>> {
        let rows = sqlx::query_as::<_, DatasetRow>(
            "SELECT acronym, name, created_at FROM datasets ORDER BY acronym ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list datasets: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Dataset::from).collect())
    }

    /// Whether a dataset with this acronym is registered
    pub async fn dataset_exists(&self, acronym: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM datasets WHERE acronym = ?")
            .bind(acronym)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to look up dataset {}: {}",
                    acronym, e
                )))
            })?;

        Ok(found.is_some())
    }
}
