// service/admin_service.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::ReferralStore,
    models::{
        customermodel::{Customer, TotalsReconciliation},
        referralmodel::{Referral, ReferralStatus, StatusCounts},
    },
    service::error::ServiceError,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgramStats {
    pub total: i64,
    pub status_counts: StatusCounts,
    pub total_rewards_paid_cents: i64,
    pub total_customers: i64,
    /// Percent of non-pending referrals that were rewarded.
    pub conversion_rate: i64,
    pub texts_sent_month: i64,
}

#[derive(Debug, Clone)]
pub struct ReferralWithReferrer {
    pub referral: Referral,
    pub referrer: Option<Customer>,
}

#[derive(Clone)]
pub struct AdminService {
    db_client: Arc<dyn ReferralStore>,
}

pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive())
        .and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&first)
}

/// `(limit, offset)` for a 1-based page.
pub fn page_bounds(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).max(1);
    (limit, (page - 1) * limit)
}

impl AdminService {
    pub fn new(db_client: Arc<dyn ReferralStore>) -> Self {
        Self { db_client }
    }

    pub async fn stats(&self) -> Result<ProgramStats, ServiceError> {
        let status_counts = self.db_client.get_status_counts().await?;
        let total_rewards_paid_cents = self.db_client.get_total_rewards_paid().await?;
        let total_customers = self.db_client.get_customer_count().await?;
        let texts_sent_month = self
            .db_client
            .count_texts_since(start_of_month(Utc::now()))
            .await?;

        Ok(ProgramStats {
            total: status_counts.total(),
            conversion_rate: status_counts.conversion_rate(),
            status_counts,
            total_rewards_paid_cents,
            total_customers,
            texts_sent_month,
        })
    }

    /// Newest first, each row with its referrer attached.
    pub async fn list_referrals(
        &self,
        status: Option<ReferralStatus>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<ReferralWithReferrer>, ServiceError> {
        let (limit, offset) = page_bounds(page, limit);
        let referrals = self.db_client.get_referrals(status, limit, offset).await?;

        let mut referrer_ids: Vec<Uuid> = referrals.iter().map(|r| r.referrer_id).collect();
        referrer_ids.sort();
        referrer_ids.dedup();

        let referrers: HashMap<Uuid, Customer> = self
            .db_client
            .get_customers_by_ids(&referrer_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(referrals
            .into_iter()
            .map(|referral| ReferralWithReferrer {
                referrer: referrers.get(&referral.referrer_id).cloned(),
                referral,
            })
            .collect())
    }

    pub async fn top_referrers(&self, limit: Option<i64>) -> Result<Vec<Customer>, ServiceError> {
        let limit = limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
        Ok(self.db_client.get_top_referrers(limit).await?)
    }

    /// Recompute a customer's aggregates from their `rewarded` referrals.
    pub async fn reconcile_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<TotalsReconciliation, ServiceError> {
        let reconciliation = self
            .db_client
            .recompute_customer_totals(customer_id)
            .await?
            .ok_or_else(|| ServiceError::CustomerNotFound(customer_id.to_string()))?;

        if reconciliation.drifted() {
            tracing::warn!(
                "Customer {} totals drifted: {} referrals / {} cents recorded, {} / {} actual",
                customer_id,
                reconciliation.previous_referral_count,
                reconciliation.previous_reward_cents,
                reconciliation.customer.total_referral_count,
                reconciliation.customer.total_reward_cents
            );
        }

        Ok(reconciliation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ProgramConfig,
        db::MemoryStore,
        service::{
            events::{Booking, JobCompletion},
            test_support::{engine_with, RecordingIssuer, RecordingNotifier},
        },
    };

    fn completion(customer_id: &str, name: &str, phone: &str, total_cents: i64) -> JobCompletion {
        JobCompletion {
            job_id: format!("job-{}", customer_id),
            customer_id: customer_id.to_string(),
            total_cents: Some(total_cents),
            customer_name: name.to_string(),
            customer_phone: Some(phone.to_string()),
            customer_email: None,
        }
    }

    #[test]
    fn month_starts_at_midnight_on_the_first() {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 15, 4, 5).unwrap();
        assert_eq!(start_of_month(now), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn page_bounds_are_clamped() {
        assert_eq!(page_bounds(None, None), (50, 0));
        assert_eq!(page_bounds(Some(3), Some(10)), (10, 20));
        assert_eq!(page_bounds(Some(0), Some(10_000)), (200, 0));
    }

    #[tokio::test]
    async fn stats_and_listing_reflect_referrals() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(RecordingIssuer::default()),
            Arc::new(RecordingNotifier::default()),
            ProgramConfig::default(),
        );
        let admin = AdminService::new(store.clone());

        let a = engine
            .handle_job_completed(&completion("ST-A", "Ann Lee", "5550001000", 30_000))
            .await
            .unwrap()
            .customer;
        engine.record_click(&a.slug, None).await.unwrap();
        let booked = engine
            .record_booking(&Booking {
                referral_slug: a.slug.clone(),
                customer_id: Some("ST-B".to_string()),
                customer_name: Some("Ben Ortiz".to_string()),
                customer_phone: Some("5550002000".to_string()),
            })
            .await
            .unwrap();
        engine
            .handle_job_completed(&completion("ST-B", "Ben Ortiz", "5550002000", 20_000))
            .await
            .unwrap();
        engine.mark_rewarded(booked.id, None).await.unwrap();
        engine.record_click(&a.slug, None).await.unwrap();

        let stats = admin.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.status_counts.rewarded, 1);
        assert_eq!(stats.status_counts.pending, 1);
        assert_eq!(stats.total_rewards_paid_cents, 7_500);
        assert_eq!(stats.total_customers, 2);
        assert_eq!(stats.conversion_rate, 100);
        assert_eq!(stats.texts_sent_month, 2);

        let rewarded = admin
            .list_referrals(Some(ReferralStatus::Rewarded), None, None)
            .await
            .unwrap();
        assert_eq!(rewarded.len(), 1);
        assert_eq!(rewarded[0].referrer.as_ref().map(|c| c.id), Some(a.id));

        let top = admin.top_referrers(None).await.unwrap();
        assert_eq!(top.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a.id]);
    }

    #[tokio::test]
    async fn reconcile_repairs_drifted_totals() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            store.clone(),
            Arc::new(RecordingIssuer::default()),
            Arc::new(RecordingNotifier::default()),
            ProgramConfig::default(),
        );
        let admin = AdminService::new(store.clone());

        let a = engine
            .handle_job_completed(&completion("ST-A", "Ann Lee", "5550001000", 30_000))
            .await
            .unwrap()
            .customer;
        store.force_totals(a.id, 3, 22_500).await;

        let reconciliation = admin.reconcile_customer(a.id).await.unwrap();
        assert!(reconciliation.drifted());
        assert_eq!(reconciliation.previous_referral_count, 3);
        assert_eq!(reconciliation.customer.total_referral_count, 0);
        assert_eq!(reconciliation.customer.total_reward_cents, 0);

        assert!(!admin.reconcile_customer(a.id).await.unwrap().drifted());
        assert!(matches!(
            admin.reconcile_customer(Uuid::new_v4()).await,
            Err(ServiceError::CustomerNotFound(_))
        ));
    }
}
