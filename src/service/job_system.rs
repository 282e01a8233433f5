// service/job_system.rs
//
// The field-service job system (ServiceTitan) as seen by the referral
// program: who a phone number belongs to, and whether they have had work done.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    config::ServiceTitanConfig,
    utils::phone::{format_phone, normalize_phone},
};

const ST_AUTH_URL: &str = "https://auth.servicetitan.io/connect/token";
const ST_API_BASE: &str = "https://api.servicetitan.io";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum JobSystemError {
    #[error("Job system credentials are not configured")]
    NotConfigured,

    #[error("Job system request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Job system returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A job-system customer flattened to what the program stores.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSystemCustomer {
    pub external_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait JobSystem: Send + Sync {
    async fn find_customer_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<JobSystemCustomer>, JobSystemError>;

    async fn completed_job_count(&self, external_id: &str) -> Result<i64, JobSystemError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StContact {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StCustomer {
    pub id: serde_json::Value,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub contacts: Vec<StContact>,
}

#[derive(Debug, Deserialize)]
struct StPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(rename = "totalCount")]
    total_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Best phone and email out of the customer's contact list.
pub fn extract_contact_info(customer: &StCustomer) -> JobSystemCustomer {
    let is_phone_type = |c: &&StContact| {
        matches!(c.kind.as_deref(), Some("Phone") | Some("MobilePhone") | Some("Cell"))
    };
    let phone = customer
        .contacts
        .iter()
        .find(is_phone_type)
        .or_else(|| {
            customer.contacts.iter().find(|c| {
                c.value
                    .as_deref()
                    .map(|v| v.chars().filter(|ch| ch.is_ascii_digit()).count() == 10)
                    .unwrap_or(false)
            })
        })
        .and_then(|c| c.value.as_deref())
        .map(normalize_phone)
        .filter(|p| !p.is_empty());

    let email = customer
        .contacts
        .iter()
        .find(|c| {
            c.kind.as_deref() == Some("Email")
                || c.value.as_deref().map(|v| v.contains('@')).unwrap_or(false)
        })
        .and_then(|c| c.value.clone())
        .or_else(|| customer.email.clone());

    let name = customer.name.clone().filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
        format!(
            "{} {}",
            customer.first_name.as_deref().unwrap_or_default(),
            customer.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    });

    let external_id = match &customer.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    JobSystemCustomer {
        external_id,
        name,
        phone,
        email,
    }
}

pub struct ServiceTitanClient {
    http: reqwest::Client,
    config: ServiceTitanConfig,
    token: Mutex<Option<CachedToken>>,
}

impl ServiceTitanClient {
    pub fn new(config: ServiceTitanConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty()
            && !self.config.client_secret.is_empty()
            && self.config.client_id != "placeholder"
    }

    async fn access_token(&self) -> Result<String, JobSystemError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        if !self.is_configured() {
            return Err(JobSystemError::NotConfigured);
        }

        let response = self
            .http
            .post(ST_AUTH_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        let response = check_status(response).await?;
        let token: StToken = response.json().await?;

        tracing::info!("Job system access token refreshed");
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(token.access_token)
    }

    async fn search_customers(
        &self,
        token: &str,
        phone: &str,
    ) -> Result<Vec<StCustomer>, JobSystemError> {
        let url = format!(
            "{}/crm/v2/tenant/{}/customers",
            ST_API_BASE, self.config.tenant_id
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header("ST-App-Key", &self.config.app_key)
            .query(&[("phone", phone), ("active", "true"), ("pageSize", "5")])
            .send()
            .await?;

        let page: StPage<StCustomer> = check_status(response).await?.json().await?;
        Ok(page.data)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, JobSystemError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(JobSystemError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl JobSystem for ServiceTitanClient {
    async fn find_customer_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<JobSystemCustomer>, JobSystemError> {
        let token = self.access_token().await?;

        let mut customers = self.search_customers(&token, phone).await?;
        if customers.is_empty() {
            customers = self.search_customers(&token, &format_phone(phone)).await?;
        }

        Ok(customers.first().map(extract_contact_info))
    }

    async fn completed_job_count(&self, external_id: &str) -> Result<i64, JobSystemError> {
        let token = self.access_token().await?;
        let url = format!("{}/jpm/v2/tenant/{}/jobs", ST_API_BASE, self.config.tenant_id);

        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .header("ST-App-Key", &self.config.app_key)
            .query(&[
                ("customerId", external_id),
                ("jobStatus", "Completed"),
                ("pageSize", "1"),
                ("includeTotal", "true"),
            ])
            .send()
            .await?;

        let page: StPage<serde_json::Value> = check_status(response).await?.json().await?;
        Ok(page.total_count.unwrap_or(page.data.len() as i64))
    }
}

struct DemoCustomer {
    phone: &'static str,
    external_id: &'static str,
    name: &'static str,
    email: &'static str,
    has_jobs: bool,
}

const DEMO_CUSTOMERS: [DemoCustomer; 4] = [
    DemoCustomer { phone: "9725550101", external_id: "ST-90001", name: "Jennifer Walsh", email: "j.walsh@email.com", has_jobs: true },
    DemoCustomer { phone: "9725550102", external_id: "ST-90002", name: "Mike Castillo", email: "m.cast@email.com", has_jobs: true },
    DemoCustomer { phone: "9725550103", external_id: "ST-90003", name: "Brenda Hoffman", email: "brenda.h@email.com", has_jobs: true },
    DemoCustomer { phone: "9725550201", external_id: "ST-90010", name: "Tyler Brooks", email: "tyler.b@email.com", has_jobs: false },
];

/// Fixed customer table for running without job-system credentials.
#[derive(Debug, Clone, Default)]
pub struct DemoJobSystem;

#[async_trait]
impl JobSystem for DemoJobSystem {
    async fn find_customer_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<JobSystemCustomer>, JobSystemError> {
        Ok(DEMO_CUSTOMERS
            .iter()
            .find(|c| c.phone == phone)
            .map(|c| JobSystemCustomer {
                external_id: c.external_id.to_string(),
                name: c.name.to_string(),
                phone: Some(c.phone.to_string()),
                email: Some(c.email.to_string()),
            }))
    }

    async fn completed_job_count(&self, external_id: &str) -> Result<i64, JobSystemError> {
        Ok(DEMO_CUSTOMERS
            .iter()
            .find(|c| c.external_id == external_id)
            .map(|c| if c.has_jobs { 1 } else { 0 })
            .unwrap_or(0))
    }
}
