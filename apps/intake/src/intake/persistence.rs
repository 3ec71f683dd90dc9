//! Persistence collaborator for confirmed record sets.
//!
//! The workflow only promises to call `persist` once per confirm; retries and
//! failure handling belong to the sink.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::normalize::RecordSet;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Stores one confirmed record set. Returns the id of the stored row.
    async fn persist(&self, session_id: Uuid, records: RecordSet) -> Result<Uuid, PersistError>;
}

/// Appends confirmed record sets to `confirmed_resumes`.
pub struct PgRecordSink {
    pool: PgPool,
}

impl PgRecordSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn persist(&self, session_id: Uuid, records: RecordSet) -> Result<Uuid, PersistError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(&records)?;

        sqlx::query(
            r#"
            INSERT INTO confirmed_resumes (id, session_id, records, field_count, confirmed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(session_id)
        .bind(payload)
        .bind(records.len() as i32)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(%session_id, %id, "Confirmed record set stored ({} fields)", records.len());
        Ok(id)
    }
}

/// Used when no database is configured: the confirmed set is only logged.
pub struct LogRecordSink;

#[async_trait]
impl RecordSink for LogRecordSink {
    async fn persist(&self, session_id: Uuid, records: RecordSet) -> Result<Uuid, PersistError> {
        let id = Uuid::new_v4();
        info!(
            %session_id,
            %id,
            low_confidence = records.iter().filter(|f| f.is_low_confidence()).count(),
            "Confirmed record set ({} fields), no database configured",
            records.len()
        );
        Ok(id)
    }
}
