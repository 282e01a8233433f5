// dtos/referraldtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::ProgramConfig,
    models::{
        customermodel::{Customer, TotalsReconciliation},
        referralmodel::{Referral, ReferralStatus, StatusCounts},
    },
    service::{
        admin_service::{ProgramStats, ReferralWithReferrer},
        lookup_service::{LookupOutcome, LookupSource},
    },
    utils::currency::cents_to_dollars,
};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClickReferralDto {
    #[validate(length(min = 1, message = "Missing slug"))]
    pub slug: String,
    pub phone: Option<String>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct PortalLookupDto {
    #[validate(length(min = 1, message = "Phone number required"))]
    pub phone: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct MarkRewardedDto {
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct MarkRejectedDto {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct AdminLoginDto {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct ReferralQueryDto {
    pub status: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<i64>,
}

impl ReferralQueryDto {
    pub fn status_filter(&self) -> Result<Option<ReferralStatus>, String> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(s) => s.parse::<ReferralStatus>().map(Some),
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct TopReferrersQueryDto {
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessDto {
    pub success: bool,
}

impl SuccessDto {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAckDto {
    pub received: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminLoginResponseDto {
    pub status: String,
    pub token: String,
}

/// What the landing page may show about a referrer.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicReferralDto {
    pub referrer_first_name: String,
    pub slug: String,
    pub link: String,
    pub discount: f64,
    pub reward: f64,
}

impl PublicReferralDto {
    pub fn from_customer(customer: &Customer, program: &ProgramConfig) -> Self {
        Self {
            referrer_first_name: customer.first_name().to_string(),
            slug: customer.slug.clone(),
            link: customer.link.clone(),
            discount: cents_to_dollars(program.discount_cents),
            reward: cents_to_dollars(program.reward_cents),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummaryDto {
    pub id: Uuid,
    pub referred_name: Option<String>,
    pub status: ReferralStatus,
    pub reward_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ReferralSummaryDto {
    pub fn filter_referral(referral: &Referral) -> Self {
        Self {
            id: referral.id,
            referred_name: referral.referred_name.clone(),
            status: referral.status,
            reward_amount: referral.reward_amount_cents.map(cents_to_dollars),
            created_at: referral.created_at,
        }
    }

    pub fn filter_referrals(referrals: &[Referral]) -> Vec<Self> {
        referrals.iter().map(Self::filter_referral).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStatsDto {
    pub referral_link: String,
    pub total_referrals: i32,
    pub total_rewards: f64,
    pub referrals: Vec<ReferralSummaryDto>,
}

impl CustomerStatsDto {
    pub fn new(customer: &Customer, referrals: &[Referral]) -> Self {
        Self {
            referral_link: customer.link.clone(),
            total_referrals: customer.total_referral_count,
            total_rewards: cents_to_dollars(customer.total_reward_cents),
            referrals: ReferralSummaryDto::filter_referrals(referrals),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PortalLookupResponseDto {
    pub found: bool,
    pub has_referral_link: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_jobs_yet: Option<bool>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_referrals: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rewards: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrals: Option<Vec<ReferralSummaryDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PortalLookupResponseDto {
    /// `None` for `NotFound`, which the handler turns into a 404.
    pub fn from_outcome(
        outcome: LookupOutcome,
        program: &ProgramConfig,
        business_name: &str,
        support_phone: &str,
    ) -> Option<Self> {
        match outcome {
            LookupOutcome::Found {
                customer,
                referrals,
                source,
                is_new,
            } => Some(Self {
                found: true,
                has_referral_link: true,
                source: Some(
                    match source {
                        LookupSource::Local => "local",
                        LookupSource::StSignup => "st_signup",
                    }
                    .to_string(),
                ),
                is_new: Some(is_new),
                name: customer.name.clone(),
                referral_link: Some(customer.link.clone()),
                total_referrals: Some(customer.total_referral_count),
                total_rewards: Some(cents_to_dollars(customer.total_reward_cents)),
                reward_amount: Some(cents_to_dollars(program.reward_cents)),
                discount_amount: Some(cents_to_dollars(program.discount_cents)),
                referrals: Some(ReferralSummaryDto::filter_referrals(&referrals)),
                ..Default::default()
            }),
            LookupOutcome::NoLinkYet { name } => {
                let first = crate::models::customermodel::first_name(&name).to_string();
                Some(Self {
                    found: true,
                    has_referral_link: false,
                    no_jobs_yet: Some(true),
                    message: Some(format!(
                        "Thanks for being a {} customer, {}! Your referral link will be ready after your first completed service. Questions? Call us at {}.",
                        business_name, first, support_phone
                    )),
                    name,
                    ..Default::default()
                })
            }
            LookupOutcome::NotFound => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerDto {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub slug: String,
    pub link: String,
    pub total_referrals: i32,
    pub total_rewards: f64,
    pub created_at: DateTime<Utc>,
}

impl ReferrerDto {
    pub fn filter_customer(customer: &Customer) -> Self {
        Self {
            id: customer.id,
            external_id: customer.external_id.clone(),
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            email: customer.email.clone(),
            slug: customer.slug.clone(),
            link: customer.link.clone(),
            total_referrals: customer.total_referral_count,
            total_rewards: cents_to_dollars(customer.total_reward_cents),
            created_at: customer.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReferralDto {
    pub id: Uuid,
    pub referred_name: Option<String>,
    pub referred_phone: Option<String>,
    pub referred_email: Option<String>,
    pub referred_external_id: Option<String>,
    pub referred_job_id: Option<String>,
    pub referred_job_value: Option<f64>,
    pub status: ReferralStatus,
    pub rejection_reason: Option<String>,
    pub reward_amount: Option<f64>,
    pub reward_transaction_id: Option<String>,
    pub reward_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub referrer: Option<ReferrerDto>,
}

impl AdminReferralDto {
    pub fn filter_referral(row: &ReferralWithReferrer) -> Self {
        let referral = &row.referral;
        Self {
            id: referral.id,
            referred_name: referral.referred_name.clone(),
            referred_phone: referral.referred_phone.clone(),
            referred_email: referral.referred_email.clone(),
            referred_external_id: referral.referred_external_id.clone(),
            referred_job_id: referral.referred_job_id.clone(),
            referred_job_value: referral.referred_job_value_cents.map(cents_to_dollars),
            status: referral.status,
            rejection_reason: referral.rejection_reason.clone(),
            reward_amount: referral.reward_amount_cents.map(cents_to_dollars),
            reward_transaction_id: referral.reward_transaction_id.clone(),
            reward_issued_at: referral.reward_issued_at,
            created_at: referral.created_at,
            updated_at: referral.updated_at,
            referrer: row.referrer.as_ref().map(ReferrerDto::filter_customer),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReferralListDto {
    pub status: String,
    pub page: i64,
    pub limit: i64,
    pub referrals: Vec<AdminReferralDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStatsDto {
    pub total: i64,
    pub status_counts: StatusCounts,
    pub total_rewards_paid: f64,
    pub total_customers: i64,
    pub conversion_rate: i64,
    pub texts_sent_month: i64,
}

impl From<ProgramStats> for ProgramStatsDto {
    fn from(stats: ProgramStats) -> Self {
        Self {
            total: stats.total,
            status_counts: stats.status_counts,
            total_rewards_paid: cents_to_dollars(stats.total_rewards_paid_cents),
            total_customers: stats.total_customers,
            conversion_rate: stats.conversion_rate,
            texts_sent_month: stats.texts_sent_month,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationDto {
    pub drifted: bool,
    pub previous_referral_count: i32,
    pub previous_rewards: f64,
    pub customer: ReferrerDto,
}

impl From<TotalsReconciliation> for ReconciliationDto {
    fn from(reconciliation: TotalsReconciliation) -> Self {
        Self {
            drifted: reconciliation.drifted(),
            previous_referral_count: reconciliation.previous_referral_count,
            previous_rewards: cents_to_dollars(reconciliation.previous_reward_cents),
            customer: ReferrerDto::filter_customer(&reconciliation.customer),
        }
    }
}
