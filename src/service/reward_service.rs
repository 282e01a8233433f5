// service/reward_service.rs
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::TangoConfig,
    utils::currency::{cents_to_dollars, format_cents},
};

const TANGO_BASE: &str = "https://api.tangocard.com/raas/v2";
const DEFAULT_CATALOG_ITEM: &str = "VISA_VIRTUAL";

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Gift card provider is not configured")]
    NotConfigured,

    #[error("Gift card request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gift card provider rejected the order ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardRequest {
    pub recipient_email: String,
    pub recipient_name: String,
    pub amount_cents: i64,
    /// Our referral id. The provider deduplicates orders on it.
    pub external_ref: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardReceipt {
    pub order_id: String,
}

#[async_trait]
pub trait RewardIssuer: Send + Sync {
    async fn issue(&self, request: RewardRequest) -> Result<RewardReceipt, RewardError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TangoOrderResponse {
    #[serde(rename = "referenceOrderID")]
    reference_order_id: Option<String>,
    #[serde(rename = "orderID")]
    order_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TangoClient {
    http: reqwest::Client,
    config: TangoConfig,
}

impl TangoClient {
    pub fn new(config: TangoConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn catalog_item(&self) -> &str {
        if self.config.catalog_item.is_empty() {
            DEFAULT_CATALOG_ITEM
        } else {
            &self.config.catalog_item
        }
    }
}

fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

#[async_trait]
impl RewardIssuer for TangoClient {
    async fn issue(&self, request: RewardRequest) -> Result<RewardReceipt, RewardError> {
        if self.config.account_id.is_empty() || self.config.api_key.is_empty() {
            return Err(RewardError::NotConfigured);
        }

        let (first_name, last_name) = split_name(&request.recipient_name);
        let payload = serde_json::json!({
            "accountIdentifier": self.config.account_id,
            "fundId": self.config.fund_id,
            "amount": { "currencyCode": "USD", "value": cents_to_dollars(request.amount_cents) },
            "utid": self.catalog_item(),
            "recipient": {
                "email": request.recipient_email,
                "firstName": first_name,
                "lastName": last_name,
            },
            "sendEmail": true,
            "externalRefID": request.external_ref.to_string(),
            "notes": format!("Referral reward, referral {}", request.external_ref),
        });

        let response = self
            .http
            .post(format!("{}/orders", TANGO_BASE))
            .basic_auth(&self.config.account_id, Some(&self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RewardError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: TangoOrderResponse = response.json().await?;
        let order_id = body
            .reference_order_id
            .or(body.order_id)
            .unwrap_or_else(|| request.external_ref.to_string());

        tracing::info!(
            "Gift card issued | order {} | to {}",
            order_id,
            request.recipient_email
        );
        Ok(RewardReceipt { order_id })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DemoRewardIssuer;

#[async_trait]
impl RewardIssuer for DemoRewardIssuer {
    async fn issue(&self, request: RewardRequest) -> Result<RewardReceipt, RewardError> {
        let order_id = format!("DEMO-ORDER-{}", Uuid::new_v4().simple());
        tracing::info!(
            "[demo] gift card of {} to {} <{}> | order {}",
            format_cents(request.amount_cents),
            request.recipient_name,
            request.recipient_email,
            order_id
        );
        Ok(RewardReceipt { order_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_recipient_name() {
        assert_eq!(split_name("Ann Marie Lee"), ("Ann".to_string(), "Marie Lee".to_string()));
        assert_eq!(split_name("Cher"), ("Cher".to_string(), String::new()));
    }

    #[tokio::test]
    async fn demo_issuer_returns_demo_order() {
        let receipt = DemoRewardIssuer
            .issue(RewardRequest {
                recipient_email: "ann@example.com".to_string(),
                recipient_name: "Ann Lee".to_string(),
                amount_cents: 7_500,
                external_ref: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert!(receipt.order_id.starts_with("DEMO-ORDER-"));
    }

    #[tokio::test]
    async fn unconfigured_tango_refuses_to_issue() {
        let client = TangoClient::new(TangoConfig::default());
        let result = client
            .issue(RewardRequest {
                recipient_email: "ann@example.com".to_string(),
                recipient_name: "Ann Lee".to_string(),
                amount_cents: 7_500,
                external_ref: Uuid::new_v4(),
            })
            .await;
        assert!(matches!(result, Err(RewardError::NotConfigured)));
    }
}
