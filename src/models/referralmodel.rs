use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "referral_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Booked,
    Completed,
    Rewarded,
    Rejected,
}

impl ReferralStatus {
    pub const ALL: [ReferralStatus; 5] = [
        ReferralStatus::Pending,
        ReferralStatus::Booked,
        ReferralStatus::Completed,
        ReferralStatus::Rewarded,
        ReferralStatus::Rejected,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Booked => "booked",
            ReferralStatus::Completed => "completed",
            ReferralStatus::Rewarded => "rewarded",
            ReferralStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReferralStatus::Rewarded | ReferralStatus::Rejected)
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReferralStatus::ALL
            .into_iter()
            .find(|status| status.to_str() == s)
            .ok_or_else(|| format!("Unknown referral status: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_name: Option<String>,
    pub referred_phone: Option<String>,
    pub referred_email: Option<String>,
    pub referred_external_id: Option<String>,
    pub referred_job_id: Option<String>,
    pub referred_job_value_cents: Option<i64>,
    pub status: ReferralStatus,
    pub rejection_reason: Option<String>,
    pub reward_amount_cents: Option<i64>,
    pub reward_transaction_id: Option<String>,
    pub reward_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    /// `rejection_reason` is set iff rejected; reward receipt fields iff rewarded.
    pub fn satisfies_invariants(&self) -> bool {
        let rejected = self.status == ReferralStatus::Rejected;
        let rewarded = self.status == ReferralStatus::Rewarded;

        self.rejection_reason.is_some() == rejected
            && self.reward_transaction_id.is_some() == rewarded
            && self.reward_issued_at.is_some() == rewarded
    }
}

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_id: Uuid,
    pub referred_name: Option<String>,
    pub referred_phone: Option<String>,
    pub referred_external_id: Option<String>,
    pub status: ReferralStatus,
}

/// Columns written by a single conditional transition. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone)]
pub struct ReferralPatch {
    pub status: ReferralStatus,
    pub referred_name: Option<String>,
    pub referred_phone: Option<String>,
    pub referred_email: Option<String>,
    pub referred_external_id: Option<String>,
    pub referred_job_id: Option<String>,
    pub referred_job_value_cents: Option<i64>,
    pub rejection_reason: Option<String>,
    pub reward_amount_cents: Option<i64>,
    pub reward_transaction_id: Option<String>,
    pub reward_issued_at: Option<DateTime<Utc>>,
}

impl ReferralPatch {
    pub fn status(status: ReferralStatus) -> Self {
        Self {
            status,
            referred_name: None,
            referred_phone: None,
            referred_email: None,
            referred_external_id: None,
            referred_job_id: None,
            referred_job_value_cents: None,
            rejection_reason: None,
            reward_amount_cents: None,
            reward_transaction_id: None,
            reward_issued_at: None,
        }
    }

    /// Apply onto an in-memory row, used by the memory store.
    pub fn apply(self, referral: &mut Referral, now: DateTime<Utc>) {
        referral.status = self.status;
        if self.referred_name.is_some() {
            referral.referred_name = self.referred_name;
        }
        if self.referred_phone.is_some() {
            referral.referred_phone = self.referred_phone;
        }
        if self.referred_email.is_some() {
            referral.referred_email = self.referred_email;
        }
        if self.referred_external_id.is_some() {
            referral.referred_external_id = self.referred_external_id;
        }
        if self.referred_job_id.is_some() {
            referral.referred_job_id = self.referred_job_id;
        }
        if self.referred_job_value_cents.is_some() {
            referral.referred_job_value_cents = self.referred_job_value_cents;
        }
        if self.rejection_reason.is_some() {
            referral.rejection_reason = self.rejection_reason;
        }
        if self.reward_amount_cents.is_some() {
            referral.reward_amount_cents = self.reward_amount_cents;
        }
        if self.reward_transaction_id.is_some() {
            referral.reward_transaction_id = self.reward_transaction_id;
        }
        if self.reward_issued_at.is_some() {
            referral.reward_issued_at = self.reward_issued_at;
        }
        referral.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusCounts {
    pub pending: i64,
    pub booked: i64,
    pub completed: i64,
    pub rewarded: i64,
    pub rejected: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: ReferralStatus, count: i64) {
        match status {
            ReferralStatus::Pending => self.pending += count,
            ReferralStatus::Booked => self.booked += count,
            ReferralStatus::Completed => self.completed += count,
            ReferralStatus::Rewarded => self.rewarded += count,
            ReferralStatus::Rejected => self.rejected += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.booked + self.completed + self.rewarded + self.rejected
    }

    /// Rewarded as a rounded percentage of every referral past the click stage.
    pub fn conversion_rate(&self) -> i64 {
        let qualified = self.total() - self.pending;
        if qualified == 0 {
            return 0;
        }
        ((self.rewarded as f64 / qualified as f64) * 100.0).round() as i64
    }
}
