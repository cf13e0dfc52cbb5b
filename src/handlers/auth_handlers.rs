//! Login/logout handlers and the session-resolving middleware.
//!
//! The middleware turns the session cookie into a `CurrentUser` request
//! extension so handlers receive the signed-in user as explicit context and
//! never read cookies themselves.

use crate::{errors::AppError, models::user::CurrentUser, services::auth_service::SESSION_COOKIE, state::AppState};
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub is_admin: bool,
}

/// `POST /api/login`
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let user = state
        .auth
        .verify_login(&payload.username, &payload.password)
        .await?;
    let session = state.auth.create_session(user.id).await?;

    let cookie = Cookie::build((SESSION_COOKIE, session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            username: user.username,
            is_admin: user.is_admin,
        }),
    ))
}

/// `POST /api/logout` — drops the session row and clears the cookie.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.auth.delete_session(cookie.value()).await?;
    }
    let cleared = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    Ok((jar.remove(cleared), StatusCode::NO_CONTENT))
}

/// Resolve the session cookie or reject with 401.
async fn resolve_user(state: &AppState, jar: &CookieJar) -> Result<CurrentUser, AppError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "authentication required"))?;
    state
        .auth
        .resolve_session(&token)
        .await?
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "authentication required"))
}

/// Middleware: any signed-in user.
pub async fn require_user(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_user(&state, &jar).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Middleware: signed-in admin.
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_user(&state, &jar).await?;
    if !user.is_admin {
        return Err(AppError::new(StatusCode::FORBIDDEN, "admin access required"));
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
