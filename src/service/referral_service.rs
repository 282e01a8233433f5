// service/referral_service.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    config::{Config, ProgramConfig},
    db::{ReferralStore, StoreError, CUSTOMER_EXTERNAL_ID_KEY, CUSTOMER_PHONE_KEY, CUSTOMER_SLUG_KEY},
    models::{
        customermodel::{Customer, NewCustomer},
        eventmodel::TextStatus,
        referralmodel::{NewReferral, Referral, ReferralPatch, ReferralStatus},
    },
    service::{
        error::ServiceError,
        events::{self, Booking, JobCompletion, JobEvent},
        reward_service::{RewardIssuer, RewardRequest},
        sms_service::SmsService,
        state_machine::{assess_job_value, ensure_transition, sources_for, transition_error, JobAssessment},
    },
    utils::{currency::format_cents, slug::generate_slug},
};

const MAX_SLUG_ATTEMPTS: usize = 5;
const MANUAL_REWARD_MARKER: &str = "MANUAL";
const DEFAULT_REJECTION_REASON: &str = "Manually rejected by admin";

/// Identity of a customer about to be enrolled as a referrer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerDetails {
    pub external_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// `created` is false when another writer enrolled the same person first.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub customer: Customer,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub customer: Customer,
    pub invite: Option<TextStatus>,
    /// The referred-side referral this job settled, if any.
    pub referral: Option<Referral>,
}

#[derive(Clone)]
pub struct ReferralService {
    db_client: Arc<dyn ReferralStore>,
    issuer: Arc<dyn RewardIssuer>,
    sms: SmsService,
    env: Config,
}

impl ReferralService {
    pub fn new(
        db_client: Arc<dyn ReferralStore>,
        issuer: Arc<dyn RewardIssuer>,
        sms: SmsService,
        env: Config,
    ) -> Self {
        Self {
            db_client,
            issuer,
            sms,
            env,
        }
    }

    pub fn program(&self) -> &ProgramConfig {
        &self.env.program
    }

    pub async fn get_referrer_by_slug(&self, slug: &str) -> Result<Customer, ServiceError> {
        self.db_client
            .get_customer_by_slug(slug)
            .await?
            .ok_or_else(|| ServiceError::SlugNotFound(slug.to_string()))
    }

    /// A customer and their referral history, newest first.
    pub async fn get_customer_stats(
        &self,
        external_id: &str,
    ) -> Result<(Customer, Vec<Referral>), ServiceError> {
        let customer = self
            .db_client
            .get_customer_by_external_id(external_id)
            .await?
            .ok_or_else(|| ServiceError::CustomerNotFound(external_id.to_string()))?;

        let referrals = self.db_client.get_referrals_for_referrer(customer.id).await?;
        Ok((customer, referrals))
    }

    /// Someone opened a referral link. Without a phone the click is recorded
    /// as an anonymous `pending` row that a later booking claims; with one it
    /// is keyed on `(referrer, phone)` like a booking.
    pub async fn record_click(&self, slug: &str, phone: Option<&str>) -> Result<Referral, ServiceError> {
        let referrer = self.get_referrer_by_slug(slug).await?;

        if let Some(phone) = phone {
            if let Some(existing) = self.db_client.find_referral_by_phone(referrer.id, phone).await? {
                tracing::debug!("Click for known referral {} ignored", existing.id);
                return Ok(existing);
            }
        }

        let created = self
            .db_client
            .create_referral(NewReferral {
                referrer_id: referrer.id,
                referred_name: None,
                referred_phone: phone.map(str::to_string),
                referred_external_id: None,
                status: ReferralStatus::Pending,
            })
            .await;

        match created {
            Ok(referral) => {
                tracing::info!(
                    "Referral {} created as pending for referrer {}",
                    referral.id,
                    referrer.id
                );
                Ok(referral)
            }
            Err(StoreError::Conflict(constraint)) => {
                let phone = phone.unwrap_or_default();
                self.db_client
                    .find_referral_by_phone(referrer.id, phone)
                    .await?
                    .ok_or(ServiceError::Conflict(constraint))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upsert keyed on `(referrer, referred phone)`. A click and a booking for
    /// the same person converge on one row whatever order they arrive in.
    pub async fn record_booking(&self, booking: &Booking) -> Result<Referral, ServiceError> {
        let referrer = self.get_referrer_by_slug(&booking.referral_slug).await?;

        match self.upsert_booking(&referrer, booking).await {
            Err(ServiceError::Conflict(constraint)) => {
                tracing::warn!(
                    "Concurrent booking for referrer {} hit {}, retrying",
                    referrer.id,
                    constraint
                );
                self.upsert_booking(&referrer, booking).await
            }
            other => other,
        }
    }

    async fn upsert_booking(
        &self,
        referrer: &Customer,
        booking: &Booking,
    ) -> Result<Referral, ServiceError> {
        let patch = ReferralPatch {
            referred_name: booking.customer_name.clone(),
            referred_phone: booking.customer_phone.clone(),
            referred_external_id: booking.customer_id.clone(),
            ..ReferralPatch::status(ReferralStatus::Booked)
        };

        if let Some(phone) = booking.customer_phone.as_deref() {
            if let Some(existing) = self.db_client.find_referral_by_phone(referrer.id, phone).await? {
                return self.refresh_booking(existing, patch).await;
            }
        }

        if let Some(click) = self.db_client.find_anonymous_pending_referral(referrer.id).await? {
            let claimed = self
                .db_client
                .update_referral_if(click.id, &[ReferralStatus::Pending], patch.clone())
                .await?;
            if let Some(referral) = claimed {
                log_transition(&referral, ReferralStatus::Pending);
                return Ok(referral);
            }
        }

        let referral = self
            .db_client
            .create_referral(NewReferral {
                referrer_id: referrer.id,
                referred_name: booking.customer_name.clone(),
                referred_phone: booking.customer_phone.clone(),
                referred_external_id: booking.customer_id.clone(),
                status: ReferralStatus::Booked,
            })
            .await?;

        tracing::info!(
            "Referral {} created as booked for referrer {} (no prior click)",
            referral.id,
            referrer.id
        );
        Ok(referral)
    }

    async fn refresh_booking(
        &self,
        existing: Referral,
        patch: ReferralPatch,
    ) -> Result<Referral, ServiceError> {
        let updated = self
            .db_client
            .update_referral_if(existing.id, &sources_for(ReferralStatus::Booked), patch)
            .await?;

        match updated {
            Some(referral) => {
                log_transition(&referral, existing.status);
                Ok(referral)
            }
            None => {
                tracing::info!(
                    "Booking for referral {} ignored, already {}",
                    existing.id,
                    existing.status
                );
                self.get_referral(existing.id).await
            }
        }
    }

    pub async fn get_referral(&self, referral_id: Uuid) -> Result<Referral, ServiceError> {
        self.db_client
            .get_referral(referral_id)
            .await?
            .ok_or(ServiceError::ReferralNotFound(referral_id))
    }

    /// Any customer's completed job: enrol them as a referrer (inviting them
    /// while they have no rewarded referrals), then settle the booked
    /// referral they were the referred party of, if there is one.
    pub async fn handle_job_completed(
        &self,
        job: &JobCompletion,
    ) -> Result<CompletionOutcome, ServiceError> {
        let customer = self
            .get_or_create_customer(CustomerDetails {
                external_id: Some(job.customer_id.clone()),
                name: job.customer_name.clone(),
                phone: job.customer_phone.clone(),
                email: job.customer_email.clone(),
            })
            .await?;

        let invite = if customer.total_referral_count == 0 && customer.sms_phone().is_some() {
            let status = self.sms.send_invite(&customer).await;
            tracing::info!("Referral invite to customer {}: {}", customer.id, status.to_str());
            Some(status)
        } else {
            None
        };

        let referral = match self
            .db_client
            .find_booked_referral_by_external_id(&job.customer_id)
            .await?
        {
            Some(booked) => self.settle_referral(booked, job).await?,
            None => None,
        };

        Ok(CompletionOutcome {
            customer,
            invite,
            referral,
        })
    }

    async fn settle_referral(
        &self,
        booked: Referral,
        job: &JobCompletion,
    ) -> Result<Option<Referral>, ServiceError> {
        let Some(total_cents) = job.total_cents else {
            tracing::warn!(
                "Job {} for referral {} carried no total, leaving it booked",
                job.job_id,
                booked.id
            );
            return Ok(Some(booked));
        };

        let job_fields = ReferralPatch {
            referred_job_id: Some(job.job_id.clone()).filter(|id| !id.is_empty()),
            referred_job_value_cents: Some(total_cents),
            referred_email: booked.referred_email.clone().or(job.customer_email.clone()),
            ..ReferralPatch::status(ReferralStatus::Completed)
        };

        let patch = match assess_job_value(total_cents, self.env.program.min_job_value_cents) {
            JobAssessment::Qualified => job_fields,
            JobAssessment::BelowThreshold { reason } => ReferralPatch {
                status: ReferralStatus::Rejected,
                rejection_reason: Some(reason),
                ..job_fields
            },
        };

        let Some(settled) = self
            .db_client
            .update_referral_if(booked.id, &[ReferralStatus::Booked], patch)
            .await?
        else {
            tracing::info!("Referral {} already settled by another event", booked.id);
            return Ok(None);
        };
        log_transition(&settled, ReferralStatus::Booked);

        if settled.status == ReferralStatus::Completed && self.env.program.auto_reward {
            return Ok(Some(self.auto_reward(settled).await));
        }

        Ok(Some(settled))
    }

    /// Best effort: the referral stays `completed` when issuance cannot happen.
    async fn auto_reward(&self, completed: Referral) -> Referral {
        match self.issue_reward(completed.id).await {
            Ok(rewarded) => rewarded,
            Err(ServiceError::MissingPayoutDestination(referrer_id)) => {
                tracing::warn!(
                    "Auto-reward for referral {} skipped, referrer {} has no email on file",
                    completed.id,
                    referrer_id
                );
                completed
            }
            Err(e) => {
                tracing::error!("Auto-reward for referral {} failed: {}", completed.id, e);
                completed
            }
        }
    }

    /// Pay a `completed` referral through the reward issuer, then record it.
    /// Safe to retry: the issuer deduplicates on the referral id.
    pub async fn issue_reward(&self, referral_id: Uuid) -> Result<Referral, ServiceError> {
        let referral = self.get_referral(referral_id).await?;
        ensure_transition(&referral, ReferralStatus::Rewarded)?;

        let referrer = self
            .db_client
            .get_customer(referral.referrer_id)
            .await?
            .ok_or_else(|| ServiceError::CustomerNotFound(referral.referrer_id.to_string()))?;

        let email = referrer
            .payout_email()
            .ok_or(ServiceError::MissingPayoutDestination(referrer.id))?;

        let amount_cents = self.env.program.reward_cents;
        let receipt = self
            .issuer
            .issue(RewardRequest {
                recipient_email: email.to_string(),
                recipient_name: referrer.name.clone(),
                amount_cents,
                external_ref: referral.id,
            })
            .await
            .map_err(|e| {
                tracing::error!("Reward issuance for referral {} failed: {}", referral.id, e);
                ServiceError::ExternalServiceUnavailable("Gift card provider".to_string())
            })?;

        let rewarded = self
            .record_reward(&referral, receipt.order_id, amount_cents)
            .await?;

        self.sms
            .send_reward_notification(
                &referrer,
                rewarded.id,
                rewarded.referred_name.as_deref(),
                amount_cents,
            )
            .await;

        Ok(rewarded)
    }

    /// Admin confirmation that a reward was paid outside the issuer.
    pub async fn mark_rewarded(
        &self,
        referral_id: Uuid,
        notes: Option<String>,
    ) -> Result<Referral, ServiceError> {
        let referral = self.get_referral(referral_id).await?;
        ensure_transition(&referral, ReferralStatus::Rewarded)?;

        let transaction_id = match notes.as_deref().map(str::trim) {
            Some(note) if !note.is_empty() => format!("{}: {}", MANUAL_REWARD_MARKER, note),
            _ => MANUAL_REWARD_MARKER.to_string(),
        };

        self.record_reward(&referral, transaction_id, self.env.program.reward_cents)
            .await
    }

    /// `completed -> rewarded` plus the referrer's aggregates. Only the caller
    /// that wins the conditional update touches the aggregates.
    async fn record_reward(
        &self,
        referral: &Referral,
        transaction_id: String,
        amount_cents: i64,
    ) -> Result<Referral, ServiceError> {
        let patch = ReferralPatch {
            reward_amount_cents: Some(amount_cents),
            reward_transaction_id: Some(transaction_id),
            reward_issued_at: Some(Utc::now()),
            ..ReferralPatch::status(ReferralStatus::Rewarded)
        };

        let Some(rewarded) = self
            .db_client
            .update_referral_if(referral.id, &sources_for(ReferralStatus::Rewarded), patch)
            .await?
        else {
            let current = self.get_referral(referral.id).await?;
            return Err(transition_error(current.id, current.status, ReferralStatus::Rewarded)
                .unwrap_or(ServiceError::AlreadyRewarded(current.id)));
        };
        log_transition(&rewarded, referral.status);

        match self
            .db_client
            .add_reward_to_totals(rewarded.referrer_id, amount_cents)
            .await
        {
            Ok(referrer) => tracing::info!(
                "Referrer {} now has {} rewarded referrals totalling {}",
                referrer.id,
                referrer.total_referral_count,
                format_cents(referrer.total_reward_cents)
            ),
            Err(e) => tracing::error!(
                "Referral {} rewarded but totals for referrer {} not updated ({}); reconcile the customer",
                rewarded.id,
                rewarded.referrer_id,
                e
            ),
        }

        Ok(rewarded)
    }

    pub async fn mark_rejected(
        &self,
        referral_id: Uuid,
        reason: Option<String>,
    ) -> Result<Referral, ServiceError> {
        let referral = self.get_referral(referral_id).await?;
        ensure_transition(&referral, ReferralStatus::Rejected)?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

        let patch = ReferralPatch {
            rejection_reason: Some(reason),
            ..ReferralPatch::status(ReferralStatus::Rejected)
        };

        match self
            .db_client
            .update_referral_if(referral.id, &sources_for(ReferralStatus::Rejected), patch)
            .await?
        {
            Some(rejected) => {
                log_transition(&rejected, referral.status);
                Ok(rejected)
            }
            None => {
                let current = self.get_referral(referral.id).await?;
                Err(transition_error(current.id, current.status, ReferralStatus::Rejected)
                    .unwrap_or_else(|| ServiceError::Other(format!("Referral {} changed concurrently", current.id))))
            }
        }
    }

    /// Log the raw payload, normalize it and run the matching transition.
    /// The raw row is flagged processed once the transition went through.
    pub async fn process_event(&self, payload: &Value) -> Result<(), ServiceError> {
        let record = self.db_client.log_job_event(events::summarize(payload)).await?;

        match events::normalize(payload)? {
            Some(JobEvent::JobCompleted(job)) => {
                let outcome = self.handle_job_completed(&job).await?;
                tracing::info!(
                    "Job {} completed for customer {}, referral {:?}",
                    job.job_id,
                    outcome.customer.id,
                    outcome.referral.map(|r| (r.id, r.status))
                );
            }
            Some(JobEvent::BookingCreated(booking)) => {
                self.record_booking(&booking).await?;
            }
            None => {
                tracing::debug!("Event {} ({}) not relevant to referrals", record.id, record.event_type);
            }
        }

        self.db_client.mark_job_event_processed(record.id).await?;
        Ok(())
    }

    /// Existing customer for the external id, or a freshly enrolled one.
    pub async fn get_or_create_customer(&self, details: CustomerDetails) -> Result<Customer, ServiceError> {
        Ok(self.get_or_create_customer_enrollment(details).await?.customer)
    }

    pub async fn get_or_create_customer_enrollment(
        &self,
        details: CustomerDetails,
    ) -> Result<Enrollment, ServiceError> {
        if let Some(external_id) = details.external_id.as_deref() {
            if let Some(customer) = self.db_client.get_customer_by_external_id(external_id).await? {
                return Ok(Enrollment {
                    customer,
                    created: false,
                });
            }
        }
        self.register_customer(details).await
    }

    /// Insert with a fresh slug. Slug collisions retry with a new suffix; an
    /// external id or phone collision means someone else enrolled this person
    /// first, and that row is returned.
    pub async fn register_customer(&self, details: CustomerDetails) -> Result<Enrollment, ServiceError> {
        for _ in 0..MAX_SLUG_ATTEMPTS {
            let slug = generate_slug(&details.name);
            let created = self
                .db_client
                .create_customer(NewCustomer {
                    external_id: details.external_id.clone(),
                    name: details.name.clone(),
                    phone: details.phone.clone(),
                    email: details.email.clone(),
                    link: self.env.referral_link(&slug),
                    slug: slug.clone(),
                })
                .await;

            match created {
                Ok(customer) => {
                    tracing::info!("Customer {} enrolled with slug {}", customer.id, customer.slug);
                    return Ok(Enrollment {
                        customer,
                        created: true,
                    });
                }
                Err(e) if e.is_conflict_on(CUSTOMER_SLUG_KEY) => {
                    tracing::debug!("Slug {} taken, regenerating", slug);
                }
                Err(StoreError::Conflict(constraint)) => {
                    let customer = self.existing_after_conflict(&details, constraint).await?;
                    return Ok(Enrollment {
                        customer,
                        created: false,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict(CUSTOMER_SLUG_KEY.to_string()))
    }

    async fn existing_after_conflict(
        &self,
        details: &CustomerDetails,
        constraint: String,
    ) -> Result<Customer, ServiceError> {
        let existing = if constraint == CUSTOMER_EXTERNAL_ID_KEY {
            match details.external_id.as_deref() {
                Some(external_id) => self.db_client.get_customer_by_external_id(external_id).await?,
                None => None,
            }
        } else if constraint == CUSTOMER_PHONE_KEY {
            match details.phone.as_deref() {
                Some(phone) => {
                    let owner = self.db_client.get_customer_by_phone(phone).await?;
                    if let Some(owner) = owner.as_ref() {
                        if owner.external_id != details.external_id {
                            tracing::warn!(
                                "Phone {} already belongs to customer {}, using that record",
                                phone,
                                owner.id
                            );
                        }
                    }
                    owner
                }
                None => None,
            }
        } else {
            None
        };

        existing.ok_or(ServiceError::Conflict(constraint))
    }
}

fn log_transition(referral: &Referral, from: ReferralStatus) {
    tracing::info!(
        "Referral {} moved {} -> {} (referrer {})",
        referral.id,
        from,
        referral.status,
        referral.referrer_id
    );
    if !referral.satisfies_invariants() {
        tracing::error!(
            "Referral {} is {} but its rejection/reward fields disagree",
            referral.id,
            referral.status
        );
    }
}
