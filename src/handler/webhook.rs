// handler/webhook.rs
use std::sync::Arc;

use axum::{body::Bytes, http::HeaderMap, response::IntoResponse, routing::post, Extension, Json, Router};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{
    dtos::WebhookAckDto,
    error::{ErrorMessage, HttpError},
    service::error::ServiceError,
    AppState,
};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

pub fn webhook_handler() -> Router {
    Router::new().route("/servicetitan", post(servicetitan_webhook))
}

/// Acknowledges immediately; the event is processed after the response so
/// slow processing never makes the job system retry.
pub async fn servicetitan_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    if let Some(secret) = app_state.env.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();

        if !verify_signature(&body, signature, secret) {
            tracing::warn!("Invalid webhook signature received");
            return Err(HttpError::unauthorized(
                ErrorMessage::InvalidWebhookSignature.to_string(),
            ));
        }
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or_else(|e| {
        tracing::warn!("Webhook body is not JSON: {}", e);
        Value::String(String::from_utf8_lossy(&body).into_owned())
    });

    let referral_service = app_state.referral_service.clone();
    tokio::spawn(async move {
        match referral_service.process_event(&payload).await {
            Ok(()) => {}
            Err(e @ ServiceError::MalformedEvent(_)) | Err(e @ ServiceError::SlugNotFound(_)) => {
                tracing::warn!("Webhook event skipped: {}", e);
            }
            Err(e) => tracing::error!("Webhook processing failed: {}", e),
        }
    });

    Ok(Json(WebhookAckDto { received: true }))
}

/// `signature` is the lowercase hex HMAC-SHA256 of the raw body.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    let expected = hex::encode(mac.finalize().into_bytes());
    ConstantTimeEq::ct_eq(signature.trim().as_bytes(), expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_matching_signature_only() {
        let body = br#"{"eventType":"job.completed"}"#;
        let signature = sign(body, "s3cret");

        assert!(verify_signature(body, &signature, "s3cret"));
        assert!(!verify_signature(body, &signature, "other"));
        assert!(!verify_signature(b"{}", &signature, "s3cret"));
        assert!(!verify_signature(body, "", "s3cret"));
    }
}
