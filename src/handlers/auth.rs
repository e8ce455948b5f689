//! Authentication handlers
//!
//! Login, logout, token refresh, current admin and the password reset flow.
//! Tokens travel in HttpOnly cookies.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, TokenKind};
use crate::email as mail;
use crate::entity::admin::{self, AdminProfile, AdminRole};
use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::auth::{ACCESS_COOKIE, REFRESH_COOKIE};
use crate::middleware::CurrentAdmin;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::validation::{self, Errors};

const BAD_CREDENTIALS: &str = "Invalid username or password";
const BAD_RESET_TOKEN: &str = "Invalid or expired reset token";

/// HttpOnly token cookie scoped to the whole site
pub fn token_cookie(name: &'static str, value: String, max_age_secs: i64, production: bool) -> Cookie<'static> {
    let site = if production {
        "SameSite=None; Secure"
    } else {
        "SameSite=Lax"
    };
    let raw = format!("{}={}; Path=/; Max-Age={}; HttpOnly; {}", name, value, max_age_secs, site);

    match Cookie::parse(raw) {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::warn!("Falling back to session cookie for {}: {}", name, e);
            Cookie::build((name, value))
                .path("/")
                .http_only(true)
                .secure(production)
                .same_site(if production { SameSite::None } else { SameSite::Lax })
                .build()
        }
    }
}

fn clear_token_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: AdminRole,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: SessionUser,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<ApiResponse<LoginResponse>>)> {
    let Json(req) = payload?;

    let mut errors = Errors::new();
    let username = validation::non_empty(req.username.as_deref());
    let password = req.password.as_deref().filter(|p| !p.is_empty());
    if username.is_none() {
        errors.push("username", "Username is required");
    }
    if password.is_none() {
        errors.push("password", "Password is required");
    }
    errors.into_result()?;
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    };

    let Some(account) = admin::Entity::find()
        .filter(admin::Column::Username.eq(username))
        .one(state.db.as_ref())
        .await?
    else {
        tracing::warn!("Login failed: unknown user {}", username);
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    };

    if !auth::verify_password(password, &account.password) {
        tracing::warn!("Login failed: wrong password for {}", username);
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
    }

    let access = state.tokens.issue(TokenKind::Access, &account)?;
    let refresh = state.tokens.issue(TokenKind::Refresh, &account)?;
    let production = state.config.is_production();
    let jar = jar
        .add(token_cookie(ACCESS_COOKIE, access, state.config.auth.access_ttl_secs, production))
        .add(token_cookie(REFRESH_COOKIE, refresh, state.config.auth.refresh_ttl_secs, production));

    tracing::info!("{} ({}) logged in", account.username, account.role);

    let user = SessionUser {
        id: account.id,
        username: account.username,
        email: account.email,
        role: account.role,
    };
    Ok((jar, Json(ApiResponse::ok("Login successful", LoginResponse { user }))))
}

/// POST /api/auth/logout
pub async fn logout(
    Extension(current): Extension<CurrentAdmin>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<()>>) {
    tracing::info!("{} logged out", current.username);
    (clear_token_cookies(jar), Json(ApiResponse::message("Logout successful")))
}

/// POST /api/auth/refresh
///
/// Re-signs the refresh token's claims as a new access token. Any failure
/// clears both cookies.
pub async fn refresh(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) else {
        return AppError::Unauthorized("Refresh token required".to_string()).into_response();
    };

    let access = state
        .tokens
        .verify(TokenKind::Refresh, &token)
        .and_then(|claims| state.tokens.reissue(TokenKind::Access, &claims));

    match access {
        Ok(access) => {
            let cookie = token_cookie(
                ACCESS_COOKIE,
                access,
                state.config.auth.access_ttl_secs,
                state.config.is_production(),
            );
            (jar.add(cookie), Json(ApiResponse::message("Token refreshed successfully"))).into_response()
        }
        Err(e) => {
            tracing::debug!("Refresh rejected: {}", e);
            (
                clear_token_cookies(jar),
                AppError::Unauthorized("Invalid or expired refresh token".to_string()),
            )
                .into_response()
        }
    }
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAdmin>,
) -> AppResult<Json<ApiResponse<AdminProfile>>> {
    let account = admin::Entity::find_by_id(current.id)
        .one(state.db.as_ref())
        .await?
        .ok_or_not_found("User not found")?;
    Ok(Json(ApiResponse::ok("User retrieved successfully", AdminProfile::from(account))))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

fn reset_link(frontend_url: &str, token: &str, email: &str) -> String {
    let base = format!("{}/reset-password", frontend_url.trim_end_matches('/'));
    match reqwest::Url::parse_with_params(&base, &[("token", token), ("email", email)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?token={}&email={}", base, token, email),
    }
}

/// POST /api/auth/forgot-password
///
/// Responds the same whether or not the address belongs to an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Json(req) = payload?;
    let email = validation::parse_email(req.email.as_deref().unwrap_or_default())
        .map_err(|msg| AppError::validation("email", msg))?;

    if let Some(account) = admin::Entity::find()
        .filter(admin::Column::Email.eq(email.as_str()))
        .one(state.db.as_ref())
        .await?
    {
        let (token, digest) = auth::new_reset_token();
        let expiry = Utc::now() + Duration::seconds(state.config.auth.reset_ttl_secs);

        let username = account.username.clone();
        let mut active: admin::ActiveModel = account.into();
        active.reset_token = Set(Some(digest));
        active.reset_token_expiry = Set(Some(expiry));
        active.updated_at = Set(Utc::now());
        active.update(state.db.as_ref()).await?;

        let link = reset_link(&state.config.frontend_url, &token, &email);
        mail::send_in_background(
            state.mailer.clone(),
            mail::password_reset(&email, &username, &link),
        );
        tracing::info!("Password reset requested for {}", username);
    } else {
        tracing::debug!("Password reset requested for unknown address");
    }

    Ok(Json(ApiResponse::message(
        "If an account with that email exists, a password reset link has been sent",
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub token: Option<String>,
    pub new_password: Option<String>,
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Json(req) = payload?;

    let mut errors = Errors::new();
    let email = errors.check(
        "email",
        validation::parse_email(req.email.as_deref().unwrap_or_default()),
    );
    let token = validation::non_empty(req.token.as_deref());
    if token.is_none() {
        errors.push("token", "Reset token is required");
    }
    let new_password = req.new_password.as_deref().unwrap_or_default();
    errors.check("newPassword", validation::check_password_policy(new_password));
    errors.into_result()?;
    let (Some(email), Some(token)) = (email, token) else {
        return Err(AppError::BadRequest(BAD_RESET_TOKEN.to_string()));
    };

    let account = admin::Entity::find()
        .filter(admin::Column::Email.eq(email.as_str()))
        .filter(admin::Column::ResetToken.eq(auth::hash_reset_token(token)))
        .filter(admin::Column::ResetTokenExpiry.gt(Utc::now()))
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::BadRequest(BAD_RESET_TOKEN.to_string()))?;

    let username = account.username.clone();
    let mut active: admin::ActiveModel = account.into();
    active.password = Set(auth::hash_password(new_password)?);
    active.reset_token = Set(None);
    active.reset_token_expiry = Set(None);
    active.updated_at = Set(Utc::now());
    active.update(state.db.as_ref()).await?;

    mail::send_in_background(
        state.mailer.clone(),
        mail::password_reset_success(&email, &username),
    );
    tracing::info!("Password reset completed for {}", username);

    Ok(Json(ApiResponse::message("Password has been reset successfully")))
}
