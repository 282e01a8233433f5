// service/lookup_service.rs
//
// Self-service portal: "what is my referral link?" by phone number.
use std::sync::Arc;

use serde::Serialize;

use crate::{
    db::ReferralStore,
    models::{customermodel::Customer, referralmodel::Referral},
    service::{
        error::ServiceError,
        job_system::JobSystem,
        referral_service::{CustomerDetails, ReferralService},
    },
    utils::phone::canonical_phone,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    Local,
    StSignup,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found {
        customer: Customer,
        referrals: Vec<Referral>,
        source: LookupSource,
        is_new: bool,
    },
    /// A known job-system customer without a completed job yet.
    NoLinkYet { name: String },
    NotFound,
}

#[derive(Clone)]
pub struct LookupService {
    db_client: Arc<dyn ReferralStore>,
    job_system: Arc<dyn JobSystem>,
    referral_service: ReferralService,
}

impl LookupService {
    pub fn new(
        db_client: Arc<dyn ReferralStore>,
        job_system: Arc<dyn JobSystem>,
        referral_service: ReferralService,
    ) -> Self {
        Self {
            db_client,
            job_system,
            referral_service,
        }
    }

    pub async fn lookup(&self, raw_phone: &str) -> Result<LookupOutcome, ServiceError> {
        let phone = canonical_phone(raw_phone)
            .ok_or_else(|| ServiceError::Validation("Invalid phone number".to_string()))?;

        if let Some(customer) = self.db_client.get_customer_by_phone(&phone).await? {
            return self.found(customer, LookupSource::Local, false).await;
        }

        tracing::info!("{} not enrolled locally, checking the job system", phone);

        let remote = self
            .job_system
            .find_customer_by_phone(&phone)
            .await
            .map_err(unavailable)?;

        let Some(remote) = remote else {
            tracing::info!("{} not found in the job system", phone);
            return Ok(LookupOutcome::NotFound);
        };

        let completed_jobs = self
            .job_system
            .completed_job_count(&remote.external_id)
            .await
            .map_err(unavailable)?;

        if completed_jobs == 0 {
            tracing::info!("Customer {} has no completed jobs yet", remote.external_id);
            return Ok(LookupOutcome::NoLinkYet { name: remote.name });
        }

        let enrollment = self
            .referral_service
            .get_or_create_customer_enrollment(CustomerDetails {
                external_id: Some(remote.external_id),
                name: remote.name,
                phone: Some(phone),
                email: remote.email,
            })
            .await?;

        let source = if enrollment.created {
            LookupSource::StSignup
        } else {
            LookupSource::Local
        };
        self.found(enrollment.customer, source, enrollment.created).await
    }

    async fn found(
        &self,
        customer: Customer,
        source: LookupSource,
        is_new: bool,
    ) -> Result<LookupOutcome, ServiceError> {
        let referrals = if is_new {
            Vec::new()
        } else {
            self.db_client.get_referrals_for_referrer(customer.id).await?
        };

        Ok(LookupOutcome::Found {
            customer,
            referrals,
            source,
            is_new,
        })
    }
}

fn unavailable(err: impl std::fmt::Display) -> ServiceError {
    tracing::error!("Job system lookup failed: {}", err);
    ServiceError::ExternalServiceUnavailable("Customer lookup".to_string())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        config::ProgramConfig,
        db::{CustomerExt, MemoryStore},
        models::customermodel::NewCustomer,
        service::{
            job_system::{JobSystemCustomer, JobSystemError},
            test_support::{engine_with, FakeJobSystem, RecordingIssuer, RecordingNotifier},
        },
    };

    fn st_customer(id: &str, name: &str, phone: &str) -> JobSystemCustomer {
        JobSystemCustomer {
            external_id: id.to_string(),
            name: name.to_string(),
            phone: Some(phone.to_string()),
            email: Some("someone@example.com".to_string()),
        }
    }

    fn service(store: Arc<MemoryStore>, job_system: Arc<dyn JobSystem>) -> LookupService {
        let engine = engine_with(
            store.clone(),
            Arc::new(RecordingIssuer::default()),
            Arc::new(RecordingNotifier::default()),
            ProgramConfig::default(),
        );
        LookupService::new(store, job_system, engine)
    }

    #[tokio::test]
    async fn malformed_phone_is_rejected() {
        let lookup = service(Arc::new(MemoryStore::new()), Arc::new(FakeJobSystem::default()));
        assert!(matches!(lookup.lookup("555-0100").await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn local_customer_skips_job_system() {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(FakeJobSystem::default());
        store
            .create_customer(NewCustomer {
                external_id: Some("ST-1".to_string()),
                name: "Ann Lee".to_string(),
                phone: Some("5550001000".to_string()),
                email: None,
                slug: "ann-l-abcd".to_string(),
                link: "https://example.com/referral?r=ann-l-abcd".to_string(),
            })
            .await
            .unwrap();

        let outcome = service(store, jobs.clone()).lookup("+1 (555) 000-1000").await.unwrap();
        match outcome {
            LookupOutcome::Found { customer, source, is_new, .. } => {
                assert_eq!(customer.slug, "ann-l-abcd");
                assert_eq!(source, LookupSource::Local);
                assert!(!is_new);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(jobs.lookups(), 0);
    }

    #[tokio::test]
    async fn qualified_remote_customer_is_enrolled_once() {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(
            FakeJobSystem::default().with_customer(st_customer("ST-9", "Jennifer Walsh", "9725550101"), 2),
        );
        let lookup = service(store.clone(), jobs.clone());

        let first = lookup.lookup("972-555-0101").await.unwrap();
        let LookupOutcome::Found { customer, source, is_new, referrals } = first else {
            panic!("expected a link");
        };
        assert_eq!(source, LookupSource::StSignup);
        assert!(is_new);
        assert!(referrals.is_empty());
        assert!(customer.slug.starts_with("jennifer-w-"));
        assert_eq!(customer.external_id.as_deref(), Some("ST-9"));

        let second = lookup.lookup("9725550101").await.unwrap();
        assert!(matches!(second, LookupOutcome::Found { source: LookupSource::Local, is_new: false, .. }));
        assert_eq!(store.get_customer_count().await.unwrap(), 1);
        assert_eq!(jobs.lookups(), 1);
    }

    #[tokio::test]
    async fn remote_customer_without_jobs_gets_no_link() {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(
            FakeJobSystem::default().with_customer(st_customer("ST-10", "Tyler Brooks", "9725550201"), 0),
        );

        let outcome = service(store.clone(), jobs).lookup("9725550201").await.unwrap();
        assert_eq!(outcome, LookupOutcome::NoLinkYet { name: "Tyler Brooks".to_string() });
        assert_eq!(store.get_customer_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_phone_is_not_found() {
        let lookup = service(Arc::new(MemoryStore::new()), Arc::new(FakeJobSystem::default()));
        assert_eq!(lookup.lookup("5550009999").await.unwrap(), LookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn unreachable_job_system_is_unavailable() {
        let jobs = Arc::new(FakeJobSystem::default());
        jobs.go_down();
        let lookup = service(Arc::new(MemoryStore::new()), jobs);
        assert!(matches!(
            lookup.lookup("5550009999").await,
            Err(ServiceError::ExternalServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn customer_enrolled_by_webhook_without_phone_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(
            FakeJobSystem::default().with_customer(st_customer("ST-9", "Jennifer Walsh", "9725550101"), 1),
        );
        store
            .create_customer(NewCustomer {
                external_id: Some("ST-9".to_string()),
                name: "Jennifer Walsh".to_string(),
                phone: None,
                email: None,
                slug: "jennifer-w-zzzz".to_string(),
                link: "https://example.com/referral?r=jennifer-w-zzzz".to_string(),
            })
            .await
            .unwrap();

        let outcome = service(store.clone(), jobs).lookup("9725550101").await.unwrap();
        match outcome {
            LookupOutcome::Found { customer, is_new, .. } => {
                assert_eq!(customer.slug, "jennifer-w-zzzz");
                assert!(!is_new);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.get_customer_count().await.unwrap(), 1);
    }

    /// Enrolls a competing record under the same phone while the remote
    /// lookup is in flight, after the local fast path has already missed.
    struct RacingJobSystem {
        store: Arc<MemoryStore>,
        inner: FakeJobSystem,
    }

    #[async_trait]
    impl JobSystem for RacingJobSystem {
        async fn find_customer_by_phone(
            &self,
            phone: &str,
        ) -> Result<Option<JobSystemCustomer>, JobSystemError> {
            self.store
                .create_customer(NewCustomer {
                    external_id: Some("ST-OLD".to_string()),
                    name: "Jen Walsh".to_string(),
                    phone: Some(phone.to_string()),
                    email: None,
                    slug: "jen-w-racy".to_string(),
                    link: "https://example.com/referral?r=jen-w-racy".to_string(),
                })
                .await
                .unwrap();
            self.inner.find_customer_by_phone(phone).await
        }

        async fn completed_job_count(&self, external_id: &str) -> Result<i64, JobSystemError> {
            self.inner.completed_job_count(external_id).await
        }
    }

    #[tokio::test]
    async fn phone_taken_during_enrollment_returns_existing_record() {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(RacingJobSystem {
            store: store.clone(),
            inner: FakeJobSystem::default()
                .with_customer(st_customer("ST-9", "Jennifer Walsh", "9725550101"), 3),
        });

        let outcome = service(store.clone(), jobs).lookup("(972) 555-0101").await.unwrap();
        match outcome {
            LookupOutcome::Found { customer, source, is_new, .. } => {
                assert_eq!(customer.slug, "jen-w-racy");
                assert_eq!(customer.external_id.as_deref(), Some("ST-OLD"));
                assert_eq!(source, LookupSource::Local);
                assert!(!is_new);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.get_customer_count().await.unwrap(), 1);
    }
}
