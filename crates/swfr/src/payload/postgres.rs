//! PostgreSQL payload persister.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

use super::PayloadPersister;
use crate::error::{Error, Result};

/// Stores payloads in `swfr.payloads`, addressed as `pg://payloads/<key>`.
///
/// # Database Schema
///
/// | Column       | Type          | Notes                         |
/// |--------------|---------------|-------------------------------|
/// | `key`        | `TEXT`        | primary key                   |
/// | `payload`    | `JSONB`       | the payload                   |
/// | `created_at` | `TIMESTAMPTZ` | refreshed on every write     |
///
/// Saves upsert, so a retried task writing the same key is harmless.
///
/// # Example
///
/// ```ignore
/// use swfr::payload::{PayloadStore, PgPersister};
///
/// let pool = PgPool::connect("postgres://...").await?;
/// let payloads = PayloadStore::new().with_external(PgPersister::new(pool));
/// ```
#[derive(Debug, Clone)]
pub struct PgPersister {
    pool: PgPool,
}

impl PgPersister {
    /// Create a persister from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete payloads written before `cutoff`.
    ///
    /// Returns the number of rows removed. Only safe for payloads whose
    /// executions have closed.
    pub async fn purge_before(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM swfr.payloads WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        debug!(removed = result.rows_affected(), "Purged payloads");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PayloadPersister for PgPersister {
    fn scheme(&self) -> &str {
        "pg"
    }

    async fn load(&self, uri: &Url) -> Result<Value> {
        let key = uri.path().trim_start_matches('/');
        let payload: Option<Json<Value>> =
            sqlx::query_scalar("SELECT payload FROM swfr.payloads WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|Json(value)| value)
            .ok_or_else(|| Error::PayloadNotFound(uri.to_string()))
    }

    async fn save(&self, key: &str, payload: &Value) -> Result<Url> {
        let uri = Url::parse(&format!("pg://payloads/{key}"))?;
        sqlx::query(
            r#"
            INSERT INTO swfr.payloads (key, payload)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET payload = EXCLUDED.payload, created_at = now()
            "#,
        )
        .bind(key)
        .bind(Json(payload))
        .execute(&self.pool)
        .await?;
        Ok(uri)
    }
}
