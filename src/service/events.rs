// service/events.rs
//
// Maps the job system's webhook payloads onto one canonical event type
// before anything reaches the state machine.
use serde::Deserialize;
use serde_json::Value;

use crate::{
    models::eventmodel::NewJobEvent,
    service::error::ServiceError,
    utils::{currency::parse_amount_to_cents, phone::normalize_phone},
};

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    JobCompleted(JobCompletion),
    BookingCreated(Booking),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletion {
    pub job_id: String,
    pub customer_id: String,
    /// `None` when the payload carried no total at all.
    pub total_cents: Option<i64>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub referral_slug: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCustomer {
    id: Option<Value>,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCustomFields {
    referral_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    event_type: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    job_id: Option<Value>,
    id: Option<Value>,
    customer_id: Option<Value>,
    customer: Option<RawCustomer>,
    total: Option<Value>,
    job_total: Option<Value>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    referral_slug: Option<String>,
    custom_fields: Option<RawCustomFields>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    JobCompleted,
    Booking,
}

fn classify(event_type: &str) -> Option<EventKind> {
    let event_type = event_type.to_lowercase();
    if event_type.contains("job") && event_type.contains("complet") {
        Some(EventKind::JobCompleted)
    } else if event_type.contains("booking") || event_type.contains("appointment") {
        Some(EventKind::Booking)
    } else {
        None
    }
}

/// Job-system ids arrive as numbers or strings.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn amount_cents(value: Option<&Value>) -> Result<Option<i64>, ServiceError> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => parse_amount_to_cents(&n.to_string()),
        Some(Value::String(s)) => parse_amount_to_cents(s),
        Some(_) => Err("Invalid amount format".to_string()),
    };

    parsed.map(Some).map_err(|e| {
        ServiceError::MalformedEvent(format!(
            "job total {}: {}",
            value.map(Value::to_string).unwrap_or_default(),
            e
        ))
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn phone(value: Option<String>) -> Option<String> {
    value.map(|p| normalize_phone(&p)).filter(|p| !p.is_empty())
}

impl RawPayload {
    fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref().or(self.kind.as_deref())
    }

    fn customer(&self) -> &RawCustomer {
        static EMPTY: RawCustomer = RawCustomer {
            id: None,
            name: None,
            phone: None,
            email: None,
        };
        self.customer.as_ref().unwrap_or(&EMPTY)
    }

    fn customer_id(&self) -> Option<String> {
        id_string(self.customer_id.as_ref()).or_else(|| id_string(self.customer().id.as_ref()))
    }

    fn job_id(&self) -> Option<String> {
        id_string(self.job_id.as_ref()).or_else(|| id_string(self.id.as_ref()))
    }

    fn customer_name(&self) -> Option<String> {
        non_empty(self.customer_name.clone()).or_else(|| non_empty(self.customer().name.clone()))
    }

    fn customer_phone(&self) -> Option<String> {
        phone(self.customer_phone.clone()).or_else(|| phone(self.customer().phone.clone()))
    }

    fn customer_email(&self) -> Option<String> {
        non_empty(self.customer_email.clone()).or_else(|| non_empty(self.customer().email.clone()))
    }

    fn referral_slug(&self) -> Option<String> {
        non_empty(self.referral_slug.clone()).or_else(|| {
            non_empty(self.custom_fields.as_ref().and_then(|f| f.referral_slug.clone()))
        })
    }
}

/// `Ok(None)` for events the engine does not act on: unknown event types and
/// bookings that did not come through a referral link.
pub fn normalize(payload: &Value) -> Result<Option<JobEvent>, ServiceError> {
    let raw: RawPayload = serde_json::from_value(payload.clone())
        .map_err(|e| ServiceError::MalformedEvent(e.to_string()))?;

    let Some(kind) = raw.event_type().and_then(classify) else {
        return Ok(None);
    };

    match kind {
        EventKind::JobCompleted => {
            let customer_id = raw.customer_id().ok_or_else(|| {
                ServiceError::MalformedEvent("job completed event missing customerId".to_string())
            })?;
            let total_cents = amount_cents(raw.total.as_ref().or(raw.job_total.as_ref()))?;

            Ok(Some(JobEvent::JobCompleted(JobCompletion {
                job_id: raw.job_id().unwrap_or_default(),
                customer_id,
                total_cents,
                customer_name: raw
                    .customer_name()
                    .unwrap_or_else(|| "Valued Customer".to_string()),
                customer_phone: raw.customer_phone(),
                customer_email: raw.customer_email(),
            })))
        }
        EventKind::Booking => {
            let Some(referral_slug) = raw.referral_slug() else {
                return Ok(None);
            };

            Ok(Some(JobEvent::BookingCreated(Booking {
                referral_slug,
                customer_id: raw.customer_id(),
                customer_name: raw.customer_name(),
                customer_phone: raw.customer_phone(),
            })))
        }
    }
}

/// The raw-log row for a payload. Never fails, whatever the payload looks like.
pub fn summarize(payload: &Value) -> NewJobEvent {
    let field = |key: &str| id_string(payload.get(key));
    let nested_customer_id = payload.get("customer").and_then(|c| id_string(c.get("id")));
    let event_type = ["eventType", "type"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown");

    NewJobEvent {
        external_job_id: field("jobId").or_else(|| field("id")).unwrap_or_else(|| "unknown".to_string()),
        external_customer_id: field("customerId").or(nested_customer_id),
        event_type: event_type.to_string(),
        payload: payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_flat_job_completion() {
        let payload = json!({
            "eventType": "Job.Completed",
            "jobId": 9001,
            "customerId": "ST-1",
            "total": "200.50",
            "customerName": "Ann Lee",
            "customerPhone": "+1 (555) 000-1000",
            "customerEmail": "ann@example.com"
        });

        let event = normalize(&payload).unwrap().unwrap();
        assert_eq!(
            event,
            JobEvent::JobCompleted(JobCompletion {
                job_id: "9001".to_string(),
                customer_id: "ST-1".to_string(),
                total_cents: Some(20_050),
                customer_name: "Ann Lee".to_string(),
                customer_phone: Some("5550001000".to_string()),
                customer_email: Some("ann@example.com".to_string()),
            })
        );
    }

    #[test]
    fn normalizes_nested_customer_and_aliases() {
        let payload = json!({
            "type": "jobcompleted",
            "id": "J-2",
            "jobTotal": 99,
            "customer": { "id": 42, "name": "Bo Diaz", "phone": "5550002000" }
        });

        match normalize(&payload).unwrap() {
            Some(JobEvent::JobCompleted(done)) => {
                assert_eq!(done.job_id, "J-2");
                assert_eq!(done.customer_id, "42");
                assert_eq!(done.total_cents, Some(9_900));
                assert_eq!(done.customer_name, "Bo Diaz");
                assert_eq!(done.customer_email, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn completion_without_customer_is_malformed() {
        let payload = json!({ "eventType": "job.completed", "jobId": 1, "total": 10 });
        assert!(matches!(normalize(&payload), Err(ServiceError::MalformedEvent(_))));
    }

    #[test]
    fn non_numeric_total_is_malformed() {
        let payload = json!({ "eventType": "job.completed", "customerId": 1, "total": "lots" });
        assert!(matches!(normalize(&payload), Err(ServiceError::MalformedEvent(_))));
    }

    #[test]
    fn missing_total_is_carried_as_none() {
        let payload = json!({ "eventType": "job.completed", "customerId": 1 });
        match normalize(&payload).unwrap() {
            Some(JobEvent::JobCompleted(done)) => {
                assert_eq!(done.total_cents, None);
                assert_eq!(done.customer_name, "Valued Customer");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn booking_reads_slug_from_custom_fields() {
        let payload = json!({
            "eventType": "Appointment.Created",
            "customerId": "ST-2",
            "customerName": "Ben Ortiz",
            "customerPhone": "555-000-2000",
            "customFields": { "referralSlug": "ann-l-4f2a" }
        });

        assert_eq!(
            normalize(&payload).unwrap(),
            Some(JobEvent::BookingCreated(Booking {
                referral_slug: "ann-l-4f2a".to_string(),
                customer_id: Some("ST-2".to_string()),
                customer_name: Some("Ben Ortiz".to_string()),
                customer_phone: Some("5550002000".to_string()),
            }))
        );
    }

    #[test]
    fn booking_without_slug_and_unknown_types_are_ignored() {
        assert_eq!(normalize(&json!({ "eventType": "booking.created" })).unwrap(), None);
        assert_eq!(normalize(&json!({ "eventType": "invoice.paid" })).unwrap(), None);
        assert_eq!(normalize(&json!({})).unwrap(), None);
    }

    #[test]
    fn non_object_payload_is_malformed() {
        assert!(matches!(normalize(&json!([1, 2])), Err(ServiceError::MalformedEvent(_))));
    }

    #[test]
    fn summary_defaults_to_unknown() {
        let summary = summarize(&json!({ "foo": "bar" }));
        assert_eq!(summary.external_job_id, "unknown");
        assert_eq!(summary.event_type, "unknown");
        assert_eq!(summary.external_customer_id, None);

        let summary = summarize(&json!({ "type": "job.completed", "id": 7, "customer": { "id": "C1" } }));
        assert_eq!(summary.external_job_id, "7");
        assert_eq!(summary.external_customer_id.as_deref(), Some("C1"));
    }
}
