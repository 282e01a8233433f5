use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A referrer. `total_referral_count`/`total_reward_cents` are denormalized
/// from the customer's `rewarded` referrals.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub slug: String,
    pub link: String,
    pub total_referral_count: i32,
    pub total_reward_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn first_name(&self) -> &str {
        first_name(&self.name)
    }

    /// Where a gift card can be delivered.
    pub fn payout_email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn sms_phone(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.is_empty())
    }
}

pub fn first_name(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or("")
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub external_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub slug: String,
    pub link: String,
}

/// Result of recomputing a customer's aggregates from its referral rows.
#[derive(Debug, Clone, Serialize)]
pub struct TotalsReconciliation {
    pub customer: Customer,
    pub previous_referral_count: i32,
    pub previous_reward_cents: i64,
}

impl TotalsReconciliation {
    pub fn drifted(&self) -> bool {
        self.previous_referral_count != self.customer.total_referral_count
            || self.previous_reward_cents != self.customer.total_reward_cents
    }
}
