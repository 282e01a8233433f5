// db/customerdb.rs
use async_trait::async_trait;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use super::{db::DBClient, StoreError};
use crate::models::customermodel::{Customer, NewCustomer, TotalsReconciliation};

#[async_trait]
pub trait CustomerExt: Send + Sync {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError>;

    async fn get_customer_by_slug(&self, slug: &str) -> Result<Option<Customer>, StoreError>;

    async fn get_customer_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Customer>, StoreError>;

    async fn get_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, StoreError>;

    /// Fails with `StoreError::Conflict` when external id, slug or phone is taken.
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, StoreError>;

    /// Atomic `count + 1`, `rewards + amount`.
    async fn add_reward_to_totals(
        &self,
        customer_id: Uuid,
        reward_cents: i64,
    ) -> Result<Customer, StoreError>;

    /// Recompute both aggregates from the customer's `rewarded` referrals.
    async fn recompute_customer_totals(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<TotalsReconciliation>, StoreError>;

    async fn get_top_referrers(&self, limit: i64) -> Result<Vec<Customer>, StoreError>;

    async fn get_customers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Customer>, StoreError>;

    async fn get_customer_count(&self) -> Result<i64, StoreError>;
}

const CUSTOMER_COLUMNS: &str = r#"
    id, external_id, name, phone, email, slug, link,
    total_referral_count, total_reward_cents, created_at, updated_at
"#;

#[async_trait]
impl CustomerExt for DBClient {
    async fn get_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE id = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn get_customer_by_slug(&self, slug: &str) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE slug = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn get_customer_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE external_id = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn get_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE phone = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, StoreError> {
        let created = sqlx::query_as::<_, Customer>(&format!(
            r#"
            INSERT INTO customers (external_id, name, phone, email, slug, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CUSTOMER_COLUMNS
        ))
        .bind(customer.external_id)
        .bind(customer.name)
        .bind(customer.phone)
        .bind(customer.email)
        .bind(customer.slug)
        .bind(customer.link)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn add_reward_to_totals(
        &self,
        customer_id: Uuid,
        reward_cents: i64,
    ) -> Result<Customer, StoreError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            r#"
            UPDATE customers
            SET total_referral_count = total_referral_count + 1,
                total_reward_cents = total_reward_cents + $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CUSTOMER_COLUMNS
        ))
        .bind(customer_id)
        .bind(reward_cents)
        .fetch_one(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn recompute_customer_totals(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<TotalsReconciliation>, StoreError> {
        // Sub-statements share one snapshot, so `before` holds the pre-update values.
        let row = sqlx::query(
            r#"
            WITH before AS (
                SELECT total_referral_count, total_reward_cents
                FROM customers WHERE id = $1
            ),
            rewarded AS (
                SELECT COUNT(*)::INTEGER AS cnt,
                       COALESCE(SUM(reward_amount_cents), 0)::BIGINT AS cents
                FROM referrals
                WHERE referrer_id = $1 AND status = 'rewarded'
            )
            UPDATE customers c
            SET total_referral_count = rewarded.cnt,
                total_reward_cents = rewarded.cents,
                updated_at = NOW()
            FROM rewarded, before
            WHERE c.id = $1
            RETURNING c.id, c.external_id, c.name, c.phone, c.email, c.slug, c.link,
                      c.total_referral_count, c.total_reward_cents, c.created_at, c.updated_at,
                      before.total_referral_count AS previous_referral_count,
                      before.total_reward_cents AS previous_reward_cents
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(TotalsReconciliation {
                customer: Customer::from_row(&row)?,
                previous_referral_count: row.try_get("previous_referral_count")?,
                previous_reward_cents: row.try_get("previous_reward_cents")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_top_referrers(&self, limit: i64) -> Result<Vec<Customer>, StoreError> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            r#"
            SELECT {} FROM customers
            WHERE total_referral_count > 0
            ORDER BY total_referral_count DESC, total_reward_cents DESC
            LIMIT $1
            "#,
            CUSTOMER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    async fn get_customers_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Customer>, StoreError> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE id = ANY($1)",
            CUSTOMER_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    async fn get_customer_count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
