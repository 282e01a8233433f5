// routes.rs
use std::sync::Arc;

use axum::{http::StatusCode, middleware, routing::get, Extension, Json, Router};
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{admin::admin_handler, referral::referral_handler, webhook::webhook_handler},
    middleware::{api_rate_limiter, login_rate_limiter, rate_limit},
    AppState,
};

// Also confirms the store answers a trivial query.
async fn health_check(
    Extension(app_state): Extension<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let (code, status) = match app_state.db_client.get_customer_count().await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "error")
        }
    };

    (
        code,
        Json(json!({
            "status": status,
            "app": env!("CARGO_PKG_NAME"),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = referral_handler()
        .layer(middleware::from_fn_with_state(Arc::new(api_rate_limiter()), rate_limit));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
        .nest("/webhooks", webhook_handler())
        .nest("/admin", admin_handler(Arc::new(login_rate_limiter())))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use hmac::{Hmac, Mac};
    use serde_json::Value;
    use sha2::Sha256;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        db::{MemoryStore, ReferralStore},
        models::referralmodel::ReferralStatus,
        service::{
            job_system::JobSystemCustomer,
            referral_service::CustomerDetails,
            test_support::{FakeJobSystem, RecordingIssuer, RecordingNotifier},
        },
    };

    struct Harness {
        store: Arc<MemoryStore>,
        state: Arc<AppState>,
    }

    impl Harness {
        fn new(env: Config) -> Self {
            let store = Arc::new(MemoryStore::new());
            let db_client: Arc<dyn ReferralStore> = store.clone();
            let job_system = FakeJobSystem::default().with_customer(
                JobSystemCustomer {
                    external_id: "ST-900".to_string(),
                    name: "Dana Price".to_string(),
                    phone: Some("9725550900".to_string()),
                    email: Some("dana@example.com".to_string()),
                },
                2,
            );
            let state = AppState::with_clients(
                env,
                db_client,
                Arc::new(job_system),
                Arc::new(RecordingNotifier::default()),
                Arc::new(RecordingIssuer::default()),
            );
            Self {
                store,
                state: Arc::new(state),
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            create_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap()
        }

        async fn referrer(&self) -> String {
            self.state
                .referral_service
                .register_customer(CustomerDetails {
                    external_id: Some("ST-1".to_string()),
                    name: "Sarah Miller".to_string(),
                    phone: Some("9725550101".to_string()),
                    email: Some("sarah@example.com".to_string()),
                })
                .await
                .unwrap()
                .customer
                .slug
        }
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let harness = Harness::new(Config::for_tests());
        let response = harness.send(get("/health")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn public_referral_page_and_click() {
        let harness = Harness::new(Config::for_tests());

        let response = harness.send(get("/api/referral/nobody-zzzz")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let slug = harness.referrer().await;
        let response = harness.send(get(&format!("/api/referral/{}", slug))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["referrerFirstName"], "Sarah");

        let response = harness
            .send(json_request("POST", "/api/referral/click", json!({ "slug": slug })))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let referrals = harness.store.all_referrals().await;
        assert_eq!(referrals.len(), 1);
        assert_eq!(referrals[0].status, ReferralStatus::Pending);
    }

    #[tokio::test]
    async fn customer_stats_by_external_id() {
        let harness = Harness::new(Config::for_tests());

        let response = harness.send(get("/api/customer/ST-1/stats")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let slug = harness.referrer().await;
        harness
            .send(json_request(
                "POST",
                "/api/referral/click",
                json!({ "slug": slug, "phone": "(972) 555-0150" }),
            ))
            .await;

        let response = harness.send(get("/api/customer/ST-1/stats")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["totalReferrals"], 0);
        assert_eq!(body["referrals"].as_array().unwrap().len(), 1);
        assert!(body["referralLink"].as_str().unwrap().ends_with(&slug));
    }

    #[tokio::test]
    async fn portal_lookup_statuses() {
        let harness = Harness::new(Config::for_tests());

        let response = harness
            .send(json_request("POST", "/api/portal/lookup", json!({ "phone": "123" })))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = harness
            .send(json_request("POST", "/api/portal/lookup", json!({ "phone": "(972) 555-0999" })))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = harness
            .send(json_request("POST", "/api/portal/lookup", json!({ "phone": "+1 972-555-0900" })))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["found"], true);
        assert_eq!(body["hasReferralLink"], true);
    }

    #[tokio::test]
    async fn admin_api_requires_session() {
        let harness = Harness::new(Config::for_tests());

        let response = harness.send(get("/admin/api/stats")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = harness
            .send(json_request("POST", "/admin/login", json!({ "password": "wrong" })))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = harness
            .send(json_request("POST", "/admin/login", json!({ "password": "hunter2" })))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        let token = body_json(response).await["token"].as_str().unwrap().to_string();

        let request = Request::builder()
            .uri("/admin/api/stats")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = harness.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["total"], 0);

        let request = Request::builder()
            .uri("/admin/api/referrals?status=paid")
            .header(header::COOKIE, format!("admin_session={}", token))
            .body(Body::empty())
            .unwrap();
        let response = harness.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_login_unavailable_without_password() {
        let env = Config {
            admin_password: None,
            ..Config::for_tests()
        };
        let harness = Harness::new(env);

        let response = harness
            .send(json_request("POST", "/admin/login", json!({ "password": "anything" })))
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn signed_webhook_is_acked_and_processed() {
        let env = Config {
            webhook_secret: Some("whsec".to_string()),
            ..Config::for_tests()
        };
        let harness = Harness::new(env);
        let slug = harness.referrer().await;

        let payload = json!({
            "eventType": "booking.created",
            "customerId": "ST-200",
            "customerName": "Tom Jones",
            "customerPhone": "972-555-0199",
            "referralSlug": slug,
        })
        .to_string();

        let unsigned = Request::builder()
            .method("POST")
            .uri("/webhooks/servicetitan")
            .header("x-webhook-signature", "deadbeef")
            .body(Body::from(payload.clone()))
            .unwrap();
        let response = harness.send(unsigned).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec").unwrap();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let signed = Request::builder()
            .method("POST")
            .uri("/webhooks/servicetitan")
            .header("x-webhook-signature", signature)
            .body(Body::from(payload))
            .unwrap();
        let response = harness.send(signed).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["received"], true);

        let mut booked = None;
        for _ in 0..50 {
            if let Some(referral) = harness.store.all_referrals().await.into_iter().next() {
                booked = Some(referral);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let booked = booked.expect("booking was not processed");
        assert_eq!(booked.status, ReferralStatus::Booked);
        assert_eq!(booked.referred_phone.as_deref(), Some("9725550199"));
    }
}
