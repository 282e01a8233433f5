// service/sms_service.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{ChiirpConfig, Config},
    db::ReferralStore,
    models::{
        customermodel::{first_name, Customer},
        eventmodel::{NewTextLog, TextStatus},
    },
    utils::currency::format_cents,
};

const CHIIRP_BASE: &str = "https://api.chiirp.com/v1";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMS provider is not configured")]
    NotConfigured,

    #[error("SMS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("SMS provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentText {
    pub provider_message_id: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, to: &str, message: &str) -> Result<SentText, NotifyError>;
}

#[derive(Debug, Deserialize)]
struct ChiirpMessageResponse {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ChiirpClient {
    http: reqwest::Client,
    config: ChiirpConfig,
}

impl ChiirpClient {
    pub fn new(config: ChiirpConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for ChiirpClient {
    async fn send_text(&self, to: &str, message: &str) -> Result<SentText, NotifyError> {
        if self.config.api_key.is_empty() || self.config.from_number.is_empty() {
            return Err(NotifyError::NotConfigured);
        }

        let payload = serde_json::json!({
            "to": to,
            "from": self.config.from_number,
            "body": message,
        });

        let response = self
            .http
            .post(format!("{}/messages", CHIIRP_BASE))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChiirpMessageResponse = response.json().await?;
        let provider_message_id = body.id.map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        tracing::info!("Text sent to {} | provider id {:?}", to, provider_message_id);
        Ok(SentText { provider_message_id })
    }
}

/// Logs instead of sending. Used when the program runs without SMS credentials.
#[derive(Debug, Clone, Default)]
pub struct DemoNotifier;

#[async_trait]
impl Notifier for DemoNotifier {
    async fn send_text(&self, to: &str, message: &str) -> Result<SentText, NotifyError> {
        let preview: String = message.chars().take(80).collect();
        tracing::info!("[demo] text to {}: {}", to, preview);
        Ok(SentText {
            provider_message_id: Some(format!("DEMO-MSG-{}", Uuid::new_v4().simple())),
        })
    }
}

pub fn invite_message(
    first_name: &str,
    business_name: &str,
    link: &str,
    reward_cents: i64,
    discount_cents: i64,
) -> String {
    format!(
        "Hey {}! Thanks for choosing {}.\n\n\
         Know someone who needs AC, heating, plumbing, or electrical work? \
         Share your personal link and when they complete their first service, \
         you get a {} gift card and they save {}!\n\n\
         Your link: {}\n\n\
         Reply STOP to opt out.",
        first_name,
        business_name,
        format_cents(reward_cents),
        format_cents(discount_cents),
        link
    )
}

pub fn reward_message(
    referrer_first: &str,
    referred_name: Option<&str>,
    business_name: &str,
    reward_cents: i64,
) -> String {
    let referred_first = referred_name
        .map(first_name)
        .filter(|n| !n.is_empty())
        .unwrap_or("your friend");

    format!(
        "Great news, {}! {} just completed their first {} service. \
         Your {} gift card is on the way, check your email!",
        referrer_first,
        referred_first,
        business_name,
        format_cents(reward_cents)
    )
}

/// Sends program texts and records every attempt in the texts log.
/// Delivery is best effort: failures are logged, never propagated.
#[derive(Clone)]
pub struct SmsService {
    notifier: Arc<dyn Notifier>,
    db_client: Arc<dyn ReferralStore>,
    business_name: String,
    reward_cents: i64,
    discount_cents: i64,
}

impl SmsService {
    pub fn new(notifier: Arc<dyn Notifier>, db_client: Arc<dyn ReferralStore>, config: &Config) -> Self {
        Self {
            notifier,
            db_client,
            business_name: config.business_name.clone(),
            reward_cents: config.program.reward_cents,
            discount_cents: config.program.discount_cents,
        }
    }

    pub async fn send_invite(&self, customer: &Customer) -> TextStatus {
        let Some(phone) = customer.sms_phone() else {
            return TextStatus::Failed;
        };

        let message = invite_message(
            customer.first_name(),
            &self.business_name,
            &customer.link,
            self.reward_cents,
            self.discount_cents,
        );

        self.send_and_log(phone, message, Some(customer.id), None).await
    }

    pub async fn send_reward_notification(
        &self,
        customer: &Customer,
        referral_id: Uuid,
        referred_name: Option<&str>,
        reward_cents: i64,
    ) -> TextStatus {
        let Some(phone) = customer.sms_phone() else {
            return TextStatus::Failed;
        };

        let message = reward_message(
            first_name(&customer.name),
            referred_name,
            &self.business_name,
            reward_cents,
        );

        self.send_and_log(phone, message, Some(customer.id), Some(referral_id))
            .await
    }

    async fn send_and_log(
        &self,
        phone: &str,
        message: String,
        customer_id: Option<Uuid>,
        referral_id: Option<Uuid>,
    ) -> TextStatus {
        let (status, provider_message_id) = match self.notifier.send_text(phone, &message).await {
            Ok(sent) => (TextStatus::Sent, sent.provider_message_id),
            Err(e) => {
                tracing::warn!("Failed to send text to {}: {}", phone, e);
                (TextStatus::Failed, None)
            }
        };

        let log = NewTextLog {
            customer_id,
            referral_id,
            phone: phone.to_string(),
            message,
            provider_message_id,
            status,
        };

        if let Err(e) = self.db_client.log_text_message(log).await {
            tracing::error!("Failed to record text to {}: {}", phone, e);
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_carries_link_and_amounts() {
        let text = invite_message("Ann", "LEX Air", "https://lex.test/refer?r=ann-l-abcd", 7_500, 5_000);
        assert!(text.starts_with("Hey Ann! Thanks for choosing LEX Air."));
        assert!(text.contains("you get a $75 gift card and they save $50!"));
        assert!(text.contains("Your link: https://lex.test/refer?r=ann-l-abcd"));
        assert!(text.ends_with("Reply STOP to opt out."));
    }

    #[test]
    fn reward_text_falls_back_to_your_friend() {
        let text = reward_message("Ann", None, "LEX Air", 7_500);
        assert!(text.contains("your friend just completed their first LEX Air service"));
        assert!(text.contains("$75 gift card"));

        let text = reward_message("Ann", Some("Ben Ortiz"), "LEX Air", 7_500);
        assert!(text.starts_with("Great news, Ann! Ben just completed"));
    }

    #[tokio::test]
    async fn demo_notifier_returns_demo_id() {
        let sent = DemoNotifier.send_text("5550001000", "hello").await.unwrap();
        assert!(sent.provider_message_id.unwrap().starts_with("DEMO-MSG-"));
    }

    #[tokio::test]
    async fn unconfigured_chiirp_refuses_to_send() {
        let client = ChiirpClient::new(ChiirpConfig {
            api_key: String::new(),
            from_number: String::new(),
        });
        assert!(matches!(
            client.send_text("5550001000", "hello").await,
            Err(NotifyError::NotConfigured)
        ));
    }
}
