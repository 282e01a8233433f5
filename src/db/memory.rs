//! In-memory implementation of the store traits.
//!
//! Used when the service runs in demo mode without a database, and by the
//! tests. Unique keys and conditional updates behave like the Postgres
//! schema; all state is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CustomerExt, EventLogExt, ReferralExt, StoreError, CUSTOMER_EXTERNAL_ID_KEY,
    CUSTOMER_PHONE_KEY, CUSTOMER_SLUG_KEY, REFERRAL_REFERRER_PHONE_KEY,
};
use crate::models::{
    customermodel::{Customer, NewCustomer, TotalsReconciliation},
    eventmodel::{JobEventRecord, NewJobEvent, NewTextLog, TextStatus},
    referralmodel::{NewReferral, Referral, ReferralPatch, ReferralStatus, StatusCounts},
};

#[derive(Debug, Clone)]
struct TextLogRow {
    status: TextStatus,
    sent_at: DateTime<Utc>,
}

/// Rows are kept in insertion order, which stands in for `created_at` ordering.
#[derive(Default)]
struct Tables {
    customers: Vec<Customer>,
    referrals: Vec<Referral>,
    job_events: Vec<JobEventRecord>,
    texts: Vec<TextLogRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn all_referrals(&self) -> Vec<Referral> {
        self.tables.read().await.referrals.clone()
    }

    #[cfg(test)]
    pub async fn all_job_events(&self) -> Vec<JobEventRecord> {
        self.tables.read().await.job_events.clone()
    }

    /// Overwrite aggregates directly, bypassing the referral rows.
    #[cfg(test)]
    pub async fn force_totals(&self, customer_id: Uuid, count: i32, cents: i64) {
        let mut tables = self.tables.write().await;
        if let Some(customer) = tables.customers.iter_mut().find(|c| c.id == customer_id) {
            customer.total_referral_count = count;
            customer.total_reward_cents = cents;
        }
    }
}

#[async_trait]
impl CustomerExt for MemoryStore {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.customers.iter().find(|c| c.id == customer_id).cloned())
    }

    async fn get_customer_by_slug(&self, slug: &str) -> Result<Option<Customer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.customers.iter().find(|c| c.slug == slug).cloned())
    }

    async fn get_customer_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Customer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .find(|c| c.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn get_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .find(|c| c.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, StoreError> {
        let mut tables = self.tables.write().await;

        for existing in &tables.customers {
            if customer.external_id.is_some() && existing.external_id == customer.external_id {
                return Err(StoreError::Conflict(CUSTOMER_EXTERNAL_ID_KEY.to_string()));
            }
            if existing.slug == customer.slug {
                return Err(StoreError::Conflict(CUSTOMER_SLUG_KEY.to_string()));
            }
            if customer.phone.is_some() && existing.phone == customer.phone {
                return Err(StoreError::Conflict(CUSTOMER_PHONE_KEY.to_string()));
            }
        }

        let now = Utc::now();
        let created = Customer {
            id: Uuid::new_v4(),
            external_id: customer.external_id,
            name: customer.name,
            phone: customer.phone,
            email: customer.email,
            slug: customer.slug,
            link: customer.link,
            total_referral_count: 0,
            total_reward_cents: 0,
            created_at: now,
            updated_at: now,
        };
        tables.customers.push(created.clone());
        Ok(created)
    }

    async fn add_reward_to_totals(
        &self,
        customer_id: Uuid,
        reward_cents: i64,
    ) -> Result<Customer, StoreError> {
        let mut tables = self.tables.write().await;
        let customer = tables
            .customers
            .iter_mut()
            .find(|c| c.id == customer_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        customer.total_referral_count += 1;
        customer.total_reward_cents += reward_cents;
        customer.updated_at = Utc::now();
        Ok(customer.clone())
    }

    async fn recompute_customer_totals(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<TotalsReconciliation>, StoreError> {
        let mut tables = self.tables.write().await;

        let (count, cents) = tables
            .referrals
            .iter()
            .filter(|r| r.referrer_id == customer_id && r.status == ReferralStatus::Rewarded)
            .fold((0i32, 0i64), |(count, cents), r| {
                (count + 1, cents + r.reward_amount_cents.unwrap_or(0))
            });

        let Some(customer) = tables.customers.iter_mut().find(|c| c.id == customer_id) else {
            return Ok(None);
        };

        let previous_referral_count = customer.total_referral_count;
        let previous_reward_cents = customer.total_reward_cents;
        customer.total_referral_count = count;
        customer.total_reward_cents = cents;
        customer.updated_at = Utc::now();

        Ok(Some(TotalsReconciliation {
            customer: customer.clone(),
            previous_referral_count,
            previous_reward_cents,
        }))
    }

    async fn get_top_referrers(&self, limit: i64) -> Result<Vec<Customer>, StoreError> {
        let tables = self.tables.read().await;
        let mut top: Vec<Customer> = tables
            .customers
            .iter()
            .filter(|c| c.total_referral_count > 0)
            .cloned()
            .collect();
        top.sort_by(|a, b| {
            b.total_referral_count
                .cmp(&a.total_referral_count)
                .then(b.total_reward_cents.cmp(&a.total_reward_cents))
        });
        top.truncate(limit.max(0) as usize);
        Ok(top)
    }

    async fn get_customers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Customer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn get_customer_count(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.customers.len() as i64)
    }
}

#[async_trait]
impl ReferralExt for MemoryStore {
    async fn get_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.referrals.iter().find(|r| r.id == referral_id).cloned())
    }

    async fn create_referral(&self, referral: NewReferral) -> Result<Referral, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(phone) = referral.referred_phone.as_deref() {
            let taken = tables.referrals.iter().any(|r| {
                r.referrer_id == referral.referrer_id && r.referred_phone.as_deref() == Some(phone)
            });
            if taken {
                return Err(StoreError::Conflict(REFERRAL_REFERRER_PHONE_KEY.to_string()));
            }
        }

        let now = Utc::now();
        let created = Referral {
            id: Uuid::new_v4(),
            referrer_id: referral.referrer_id,
            referred_name: referral.referred_name,
            referred_phone: referral.referred_phone,
            referred_email: None,
            referred_external_id: referral.referred_external_id,
            referred_job_id: None,
            referred_job_value_cents: None,
            status: referral.status,
            rejection_reason: None,
            reward_amount_cents: None,
            reward_transaction_id: None,
            reward_issued_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.referrals.push(created.clone());
        Ok(created)
    }

    async fn update_referral_if(
        &self,
        referral_id: Uuid,
        expected: &[ReferralStatus],
        patch: ReferralPatch,
    ) -> Result<Option<Referral>, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(phone) = patch.referred_phone.as_deref() {
            let owner = tables
                .referrals
                .iter()
                .find(|r| r.id == referral_id)
                .map(|r| r.referrer_id);
            let taken = tables.referrals.iter().any(|r| {
                r.id != referral_id
                    && Some(r.referrer_id) == owner
                    && r.referred_phone.as_deref() == Some(phone)
            });
            if taken {
                return Err(StoreError::Conflict(REFERRAL_REFERRER_PHONE_KEY.to_string()));
            }
        }

        let Some(referral) = tables
            .referrals
            .iter_mut()
            .find(|r| r.id == referral_id && expected.contains(&r.status))
        else {
            return Ok(None);
        };

        patch.apply(referral, Utc::now());
        Ok(Some(referral.clone()))
    }

    async fn find_referral_by_phone(
        &self,
        referrer_id: Uuid,
        phone: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .iter()
            .find(|r| r.referrer_id == referrer_id && r.referred_phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn find_anonymous_pending_referral(
        &self,
        referrer_id: Uuid,
    ) -> Result<Option<Referral>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .iter()
            .rev()
            .find(|r| {
                r.referrer_id == referrer_id
                    && r.status == ReferralStatus::Pending
                    && r.referred_phone.is_none()
            })
            .cloned())
    }

    async fn find_booked_referral_by_external_id(
        &self,
        referred_external_id: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .iter()
            .find(|r| {
                r.status == ReferralStatus::Booked
                    && r.referred_external_id.as_deref() == Some(referred_external_id)
            })
            .cloned())
    }

    async fn get_referrals(
        &self,
        status: Option<ReferralStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Referral>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .iter()
            .rev()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_referrals_for_referrer(&self, referrer_id: Uuid) -> Result<Vec<Referral>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .iter()
            .rev()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect())
    }

    async fn get_status_counts(&self) -> Result<StatusCounts, StoreError> {
        let tables = self.tables.read().await;
        let mut counts = StatusCounts::default();
        for referral in &tables.referrals {
            counts.add(referral.status, 1);
        }
        Ok(counts)
    }

    async fn get_total_rewards_paid(&self) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .referrals
            .iter()
            .filter(|r| r.status == ReferralStatus::Rewarded)
            .filter_map(|r| r.reward_amount_cents)
            .sum())
    }
}

#[async_trait]
impl EventLogExt for MemoryStore {
    async fn log_job_event(&self, event: NewJobEvent) -> Result<JobEventRecord, StoreError> {
        let mut tables = self.tables.write().await;
        let record = JobEventRecord {
            id: Uuid::new_v4(),
            external_job_id: event.external_job_id,
            external_customer_id: event.external_customer_id,
            event_type: event.event_type,
            payload: event.payload,
            processed: false,
            created_at: Utc::now(),
        };
        tables.job_events.push(record.clone());
        Ok(record)
    }

    async fn mark_job_event_processed(&self, event_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(event) = tables.job_events.iter_mut().find(|e| e.id == event_id) {
            event.processed = true;
        }
        Ok(())
    }

    async fn log_text_message(&self, text: NewTextLog) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.texts.push(TextLogRow {
            status: text.status,
            sent_at: Utc::now(),
        });
        Ok(())
    }

    async fn count_texts_since(&self, since: DateTime<Utc>) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .texts
            .iter()
            .filter(|t| t.status == TextStatus::Sent && t.sent_at >= since)
            .count() as i64)
    }
}
