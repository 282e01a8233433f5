pub mod admin_service;
pub mod error;
pub mod events;
pub mod job_system;
pub mod lookup_service;
pub mod referral_service;
pub mod reward_service;
pub mod sms_service;
pub mod state_machine;

#[cfg(test)]
pub mod test_support {
    //! Recording fakes for the outbound collaborators.
    use std::collections::HashMap;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;

    use super::{
        job_system::{JobSystem, JobSystemCustomer, JobSystemError},
        referral_service::ReferralService,
        reward_service::{RewardError, RewardIssuer, RewardReceipt, RewardRequest},
        sms_service::{Notifier, NotifyError, SentText, SmsService},
    };
    use crate::{
        config::{Config, ProgramConfig},
        db::{MemoryStore, ReferralStore},
    };

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        failing: AtomicBool,
    }

    impl RecordingNotifier {
        pub fn fail_all(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        pub fn messages_to(&self, phone: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _)| to == phone)
                .map(|(_, message)| message.clone())
                .collect()
        }

        pub fn sent_to(&self, phone: &str) -> usize {
            self.messages_to(phone).len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_text(&self, to: &str, message: &str) -> Result<SentText, NotifyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::NotConfigured);
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), message.to_string()));
            Ok(SentText {
                provider_message_id: Some("MSG-1".to_string()),
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingIssuer {
        requests: Mutex<Vec<RewardRequest>>,
        fail_next: AtomicBool,
        orders: AtomicUsize,
    }

    impl RecordingIssuer {
        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn requests(&self) -> Vec<RewardRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RewardIssuer for RecordingIssuer {
        async fn issue(&self, request: RewardRequest) -> Result<RewardReceipt, RewardError> {
            self.requests.lock().unwrap().push(request);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RewardError::NotConfigured);
            }
            let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RewardReceipt {
                order_id: format!("ORDER-{}", n),
            })
        }
    }

    /// Customers keyed by phone, with their completed-job count.
    #[derive(Default)]
    pub struct FakeJobSystem {
        customers: Mutex<HashMap<String, (JobSystemCustomer, i64)>>,
        unavailable: AtomicBool,
        lookups: AtomicUsize,
    }

    impl FakeJobSystem {
        pub fn with_customer(self, customer: JobSystemCustomer, completed_jobs: i64) -> Self {
            let phone = customer.phone.clone().unwrap_or_default();
            self.customers
                .lock()
                .unwrap()
                .insert(phone, (customer, completed_jobs));
            self
        }

        pub fn go_down(&self) {
            self.unavailable.store(true, Ordering::SeqCst);
        }

        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobSystem for FakeJobSystem {
        async fn find_customer_by_phone(
            &self,
            phone: &str,
        ) -> Result<Option<JobSystemCustomer>, JobSystemError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(JobSystemError::NotConfigured);
            }
            Ok(self
                .customers
                .lock()
                .unwrap()
                .get(phone)
                .map(|(customer, _)| customer.clone()))
        }

        async fn completed_job_count(&self, external_id: &str) -> Result<i64, JobSystemError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(JobSystemError::NotConfigured);
            }
            Ok(self
                .customers
                .lock()
                .unwrap()
                .values()
                .find(|(customer, _)| customer.external_id == external_id)
                .map(|(_, jobs)| *jobs)
                .unwrap_or(0))
        }
    }

    pub fn test_config(program: ProgramConfig) -> Config {
        Config {
            program,
            ..Config::for_tests()
        }
    }

    pub fn engine_with(
        store: Arc<MemoryStore>,
        issuer: Arc<RecordingIssuer>,
        notifier: Arc<RecordingNotifier>,
        program: ProgramConfig,
    ) -> ReferralService {
        let env = test_config(program);
        let db_client: Arc<dyn ReferralStore> = store;
        let sms = SmsService::new(notifier, db_client.clone(), &env);
        ReferralService::new(db_client, issuer, sms, env)
    }
}
