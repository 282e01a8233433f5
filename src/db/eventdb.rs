// db/eventdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{db::DBClient, StoreError};
use crate::models::eventmodel::{JobEventRecord, NewJobEvent, NewTextLog};

#[async_trait]
pub trait EventLogExt: Send + Sync {
    async fn log_job_event(&self, event: NewJobEvent) -> Result<JobEventRecord, StoreError>;

    async fn mark_job_event_processed(&self, event_id: Uuid) -> Result<(), StoreError>;

    async fn log_text_message(&self, text: NewTextLog) -> Result<(), StoreError>;

    async fn count_texts_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError>;
}

#[async_trait]
impl EventLogExt for DBClient {
    async fn log_job_event(&self, event: NewJobEvent) -> Result<JobEventRecord, StoreError> {
        let record = sqlx::query_as::<_, JobEventRecord>(
            r#"
            INSERT INTO job_events (external_job_id, external_customer_id, event_type, payload, processed)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING id, external_job_id, external_customer_id, event_type, payload, processed, created_at
            "#,
        )
        .bind(event.external_job_id)
        .bind(event.external_customer_id)
        .bind(event.event_type)
        .bind(event.payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_job_event_processed(&self, event_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE job_events SET processed = TRUE WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn log_text_message(&self, text: NewTextLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO texts_log (customer_id, referral_id, phone, message, provider_message_id, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(text.customer_id)
        .bind(text.referral_id)
        .bind(text.phone)
        .bind(text.message)
        .bind(text.provider_message_id)
        .bind(text.status.to_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_texts_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM texts_log WHERE status = 'sent' AND sent_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
