// db/referraldb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{db::DBClient, StoreError};
use crate::models::referralmodel::{NewReferral, Referral, ReferralPatch, ReferralStatus, StatusCounts};

#[async_trait]
pub trait ReferralExt: Send + Sync {
    async fn get_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError>;

    /// Fails with `StoreError::Conflict` when `(referrer_id, referred_phone)` exists.
    async fn create_referral(&self, referral: NewReferral) -> Result<Referral, StoreError>;

    /// Single-row conditional update: applies `patch` only while the stored
    /// status is one of `expected`. `None` means the precondition did not hold
    /// (or the row does not exist).
    async fn update_referral_if(
        &self,
        referral_id: Uuid,
        expected: &[ReferralStatus],
        patch: ReferralPatch,
    ) -> Result<Option<Referral>, StoreError>;

    async fn find_referral_by_phone(
        &self,
        referrer_id: Uuid,
        phone: &str,
    ) -> Result<Option<Referral>, StoreError>;

    /// Most recent click that has not been tied to a person yet.
    async fn find_anonymous_pending_referral(
        &self,
        referrer_id: Uuid,
    ) -> Result<Option<Referral>, StoreError>;

    async fn find_booked_referral_by_external_id(
        &self,
        referred_external_id: &str,
    ) -> Result<Option<Referral>, StoreError>;

    async fn get_referrals(
        &self,
        status: Option<ReferralStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Referral>, StoreError>;

    async fn get_referrals_for_referrer(&self, referrer_id: Uuid) -> Result<Vec<Referral>, StoreError>;

    async fn get_status_counts(&self) -> Result<StatusCounts, StoreError>;

    async fn get_total_rewards_paid(&self) -> Result<i64, StoreError>;
}

const REFERRAL_COLUMNS: &str = r#"
    id, referrer_id, referred_name, referred_phone, referred_email,
    referred_external_id, referred_job_id, referred_job_value_cents,
    status, rejection_reason, reward_amount_cents, reward_transaction_id,
    reward_issued_at, created_at, updated_at
"#;

#[async_trait]
impl ReferralExt for DBClient {
    async fn get_referral(&self, referral_id: Uuid) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE id = $1",
            REFERRAL_COLUMNS
        ))
        .bind(referral_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn create_referral(&self, referral: NewReferral) -> Result<Referral, StoreError> {
        let created = sqlx::query_as::<_, Referral>(&format!(
            r#"
            INSERT INTO referrals (referrer_id, referred_name, referred_phone, referred_external_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referral.referrer_id)
        .bind(referral.referred_name)
        .bind(referral.referred_phone)
        .bind(referral.referred_external_id)
        .bind(referral.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn update_referral_if(
        &self,
        referral_id: Uuid,
        expected: &[ReferralStatus],
        patch: ReferralPatch,
    ) -> Result<Option<Referral>, StoreError> {
        let expected: Vec<String> = expected.iter().map(|s| s.to_str().to_string()).collect();

        let updated = sqlx::query_as::<_, Referral>(&format!(
            r#"
            UPDATE referrals
            SET status = $2,
                referred_name = COALESCE($3, referred_name),
                referred_phone = COALESCE($4, referred_phone),
                referred_email = COALESCE($5, referred_email),
                referred_external_id = COALESCE($6, referred_external_id),
                referred_job_id = COALESCE($7, referred_job_id),
                referred_job_value_cents = COALESCE($8, referred_job_value_cents),
                rejection_reason = COALESCE($9, rejection_reason),
                reward_amount_cents = COALESCE($10, reward_amount_cents),
                reward_transaction_id = COALESCE($11, reward_transaction_id),
                reward_issued_at = COALESCE($12, reward_issued_at),
                updated_at = NOW()
            WHERE id = $1 AND status::TEXT = ANY($13)
            RETURNING {}
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referral_id)
        .bind(patch.status)
        .bind(patch.referred_name)
        .bind(patch.referred_phone)
        .bind(patch.referred_email)
        .bind(patch.referred_external_id)
        .bind(patch.referred_job_id)
        .bind(patch.referred_job_value_cents)
        .bind(patch.rejection_reason)
        .bind(patch.reward_amount_cents)
        .bind(patch.reward_transaction_id)
        .bind(patch.reward_issued_at)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn find_referral_by_phone(
        &self,
        referrer_id: Uuid,
        phone: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE referrer_id = $1 AND referred_phone = $2",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn find_anonymous_pending_referral(
        &self,
        referrer_id: Uuid,
    ) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {} FROM referrals
            WHERE referrer_id = $1 AND status = 'pending' AND referred_phone IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn find_booked_referral_by_external_id(
        &self,
        referred_external_id: &str,
    ) -> Result<Option<Referral>, StoreError> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {} FROM referrals
            WHERE referred_external_id = $1 AND status = 'booked'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(referred_external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn get_referrals(
        &self,
        status: Option<ReferralStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Referral>, StoreError> {
        let referrals = sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {} FROM referrals
            WHERE ($1::referral_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }

    async fn get_referrals_for_referrer(&self, referrer_id: Uuid) -> Result<Vec<Referral>, StoreError> {
        let referrals = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE referrer_id = $1 ORDER BY created_at DESC",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }

    async fn get_status_counts(&self) -> Result<StatusCounts, StoreError> {
        let rows = sqlx::query_as::<_, (ReferralStatus, i64)>(
            "SELECT status, COUNT(*) FROM referrals GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.add(status, count);
        }
        Ok(counts)
    }

    async fn get_total_rewards_paid(&self) -> Result<i64, StoreError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(reward_amount_cents), 0)::BIGINT
            FROM referrals WHERE status = 'rewarded'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
