use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only copy of an inbound webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobEventRecord {
    pub id: Uuid,
    pub external_job_id: String,
    pub external_customer_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJobEvent {
    pub external_job_id: String,
    pub external_customer_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TextStatus {
    Sent,
    Failed,
}

impl TextStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            TextStatus::Sent => "sent",
            TextStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTextLog {
    pub customer_id: Option<Uuid>,
    pub referral_id: Option<Uuid>,
    pub phone: String,
    pub message: String,
    pub provider_message_id: Option<String>,
    pub status: TextStatus,
}
