pub mod rate_limit;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    error::{ErrorMessage, HttpError},
    utils::token,
    AppState,
};

pub use rate_limit::{api_rate_limiter, login_rate_limiter, rate_limit, RateLimiter};

pub const ADMIN_COOKIE: &str = "admin_session";
pub const ADMIN_SUBJECT: &str = "admin";

/// Stateless admin guard: a signed, unexpired token from the session cookie
/// or a `Bearer` header.
pub async fn admin_auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get(ADMIN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|auth_header| auth_header.to_str().ok())
                .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
                .map(str::to_owned)
        });

    let token = token.ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let subject = token::decode_token(token, app_state.env.jwt_secret.as_bytes())
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    if subject != ADMIN_SUBJECT {
        return Err(HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()));
    }

    Ok(next.run(req).await)
}
