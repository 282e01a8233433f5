// handler/referral.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{ClickReferralDto, CustomerStatsDto, PortalLookupDto, PortalLookupResponseDto, PublicReferralDto, SuccessDto},
    error::HttpError,
    service::error::ServiceError,
    utils::phone::canonical_phone,
    AppState,
};

pub fn referral_handler() -> Router {
    Router::new()
        .route("/referral/click", post(record_click))
        .route("/referral/:slug", get(get_referral_info))
        .route("/customer/:external_id/stats", get(get_customer_stats))
        .route("/portal/lookup", post(portal_lookup))
}

pub async fn get_referral_info(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let referrer = app_state.referral_service.get_referrer_by_slug(&slug).await?;

    Ok(Json(PublicReferralDto::from_customer(
        &referrer,
        app_state.referral_service.program(),
    )))
}

pub async fn record_click(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<ClickReferralDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let phone = body.phone.as_deref().and_then(canonical_phone);
    app_state
        .referral_service
        .record_click(body.slug.trim(), phone.as_deref())
        .await?;

    Ok(Json(SuccessDto::ok()))
}

pub async fn get_customer_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let (customer, referrals) = app_state
        .referral_service
        .get_customer_stats(&external_id)
        .await?;

    Ok(Json(CustomerStatsDto::new(&customer, &referrals)))
}

pub async fn portal_lookup(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<PortalLookupDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = match app_state.lookup_service.lookup(&body.phone).await {
        Ok(outcome) => outcome,
        Err(ServiceError::ExternalServiceUnavailable(_)) => {
            return Err(HttpError::service_unavailable(format!(
                "Unable to verify your account right now. Please try again or call {}.",
                app_state.env.support_phone
            )));
        }
        Err(e) => return Err(e.into()),
    };

    PortalLookupResponseDto::from_outcome(
        outcome,
        app_state.referral_service.program(),
        &app_state.env.business_name,
        &app_state.env.support_phone,
    )
    .map(Json)
    .ok_or_else(|| HttpError::not_found("Customer not found"))
}
