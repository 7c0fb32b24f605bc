//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;
use crate::metrics::{DB_QUERIES_TOTAL, DB_QUERY_DURATION_SECONDS};

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn observe_query(operation: &str) -> prometheus::HistogramTimer {
    DB_QUERIES_TOTAL
        .with_label_values(&[operation, "objects"])
        .inc();
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation, "objects"])
        .start_timer()
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        // Create connection string
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());

        // Create connection pool
        let pool = SqlitePool::connect(&connection_string).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Record an object delivered by an authenticated identity
    ///
    /// # Errors
    /// `Conflict` if this identity already deposited an object at `url`
    pub async fn insert_object(
        &self,
        url: &str,
        authenticated_id: &str,
        content: &serde_json::Value,
    ) -> Result<(), AppError> {
        let _timer = observe_query("insert");

        let result = sqlx::query(
            r#"
            INSERT INTO objects (url, authenticated_id, content, received_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(url)
        .bind(authenticated_id)
        .bind(content.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                Err(AppError::Conflict(format!(
                    "{} already stored for {}",
                    url, authenticated_id
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Get a publicly served object
    ///
    /// Only objects deposited by a local identity (one whose `authenticated_id`
    /// starts with `local_prefix`, e.g. `https://social.example/`) are public.
    ///
    /// # Returns
    /// The stored JSON, or None if no such object exists
    pub async fn get_public_object(
        &self,
        url: &str,
        local_prefix: &str,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let _timer = observe_query("select");

        let content: Option<String> = sqlx::query_scalar(
            r#"
            SELECT content FROM objects
            WHERE url = ? AND authenticated_id LIKE ? ESCAPE '\'
            ORDER BY rowid
            LIMIT 1
            "#,
        )
        .bind(url)
        .bind(format!("{}%", escape_like(local_prefix)))
        .fetch_optional(&self.pool)
        .await?;

        content
            .map(|text| serde_json::from_str(&text))
            .transpose()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt object {}: {}", url, e)))
    }

    /// Get every stored copy of an object, whoever deposited it
    pub async fn get_objects_by_url(&self, url: &str) -> Result<Vec<StoredObject>, AppError> {
        let _timer = observe_query("select");

        let rows = sqlx::query_as::<_, ObjectRow>(
            r#"
            SELECT url, authenticated_id, content, received_at FROM objects
            WHERE url = ?
            ORDER BY rowid
            "#,
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                StoredObject::try_from(row)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Corrupt object {}: {}", url, e)))
            })
            .collect()
    }

    /// Count objects deposited by local identities
    pub async fn count_local_objects(&self, local_prefix: &str) -> Result<i64, AppError> {
        let _timer = observe_query("count");

        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM objects WHERE authenticated_id LIKE ? ESCAPE '\'"#,
        )
        .bind(format!("{}%", escape_like(local_prefix)))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
