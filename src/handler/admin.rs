// handler/admin.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{header, HeaderMap, HeaderValue},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        AdminLoginDto, AdminLoginResponseDto, AdminReferralDto, AdminReferralListDto,
        MarkRejectedDto, MarkRewardedDto, ProgramStatsDto, ReconciliationDto, ReferralQueryDto,
        ReferrerDto, SuccessDto, TopReferrersQueryDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{admin_auth, rate_limit, RateLimiter, ADMIN_COOKIE, ADMIN_SUBJECT},
    utils::token,
    AppState,
};

pub fn admin_handler(login_limiter: Arc<RateLimiter>) -> Router {
    let api = Router::new()
        .route("/stats", get(get_stats))
        .route("/referrals", get(list_referrals))
        .route("/referrers", get(top_referrers))
        .route("/referral/:id/mark-rewarded", post(mark_rewarded))
        .route("/referral/:id/mark-rejected", post(mark_rejected))
        .route("/referral/:id/issue-reward", post(issue_reward))
        .route("/customer/:id/reconcile", post(reconcile_customer))
        .route_layer(middleware::from_fn(admin_auth));

    Router::new()
        .route(
            "/login",
            post(admin_login).route_layer(middleware::from_fn_with_state(login_limiter, rate_limit)),
        )
        .route("/logout", get(admin_logout))
        .nest("/api", api)
}

pub async fn admin_login(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<AdminLoginDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let expected = app_state
        .env
        .admin_password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| HttpError::service_unavailable(ErrorMessage::AdminNotConfigured.to_string()))?;

    let matches: bool = body.password.as_bytes().ct_eq(expected.as_bytes()).into();
    if !matches {
        tracing::warn!("Failed admin login attempt");
        return Err(HttpError::unauthorized(ErrorMessage::WrongCredentials.to_string()));
    }

    let token = token::create_token(
        ADMIN_SUBJECT,
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| HttpError::server_error(e.to_string()))?;

    let cookie = Cookie::build((ADMIN_COOKIE, token.clone()))
        .path("/")
        .max_age(time::Duration::minutes(app_state.env.jwt_maxage))
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, cookie_header(&cookie)?);

    let mut response = Json(AdminLoginResponseDto {
        status: "success".to_string(),
        token,
    })
    .into_response();
    response.headers_mut().extend(headers);

    Ok(response)
}

pub async fn admin_logout() -> Result<impl IntoResponse, HttpError> {
    let cookie = Cookie::build((ADMIN_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build();

    let mut response = Json(SuccessDto::ok()).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, cookie_header(&cookie)?);

    Ok(response)
}

pub async fn get_stats(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let stats = app_state.admin_service.stats().await?;
    Ok(Json(ProgramStatsDto::from(stats)))
}

pub async fn list_referrals(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<ReferralQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let status = query.status_filter().map_err(HttpError::bad_request)?;
    let rows = app_state
        .admin_service
        .list_referrals(status, query.page, query.limit)
        .await?;

    let (limit, _) = crate::service::admin_service::page_bounds(query.page, query.limit);
    Ok(Json(AdminReferralListDto {
        status: "success".to_string(),
        page: query.page.unwrap_or(1),
        limit,
        referrals: rows.iter().map(AdminReferralDto::filter_referral).collect(),
    }))
}

pub async fn top_referrers(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<TopReferrersQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let referrers = app_state.admin_service.top_referrers(query.limit).await?;
    let referrers: Vec<ReferrerDto> = referrers.iter().map(ReferrerDto::filter_customer).collect();

    Ok(Json(referrers))
}

pub async fn mark_rewarded(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(referral_id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let body: MarkRewardedDto = optional_json(&body)?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    app_state
        .referral_service
        .mark_rewarded(referral_id, body.notes)
        .await?;

    Ok(Json(SuccessDto::ok()))
}

pub async fn mark_rejected(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(referral_id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let body: MarkRejectedDto = optional_json(&body)?;
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    app_state
        .referral_service
        .mark_rejected(referral_id, body.reason)
        .await?;

    Ok(Json(SuccessDto::ok()))
}

pub async fn issue_reward(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(referral_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.referral_service.issue_reward(referral_id).await?;
    Ok(Json(SuccessDto::ok()))
}

pub async fn reconcile_customer(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let reconciliation = app_state.admin_service.reconcile_customer(customer_id).await?;
    Ok(Json(ReconciliationDto::from(reconciliation)))
}

// Admin actions accept an empty body in place of `{}`.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| HttpError::bad_request(e.to_string()))
}

fn cookie_header(cookie: &Cookie<'_>) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(&cookie.to_string()).map_err(|e| HttpError::server_error(e.to_string()))
}
