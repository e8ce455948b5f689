//! Authentication middleware
//!
//! Verifies the access token (cookie or bearer header) for protected API routes

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::{Claims, TokenError, TokenKind};
use crate::entity::admin::AdminRole;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Extension to store the authenticated admin in request
#[derive(Clone, Debug)]
pub struct CurrentAdmin {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: AdminRole,
}

impl From<Claims> for CurrentAdmin {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            email: claims.email,
            role: claims.role,
        }
    }
}

impl CurrentAdmin {
    pub fn is_admin(&self) -> bool {
        self.role == AdminRole::Admin
    }

    /// Full admins only
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Access denied. Admin privileges required.".to_string(),
            ))
        }
    }

    /// Admins and sub-admins
    pub fn require_staff(&self) -> AppResult<()> {
        match self.role {
            AdminRole::Admin | AdminRole::SubAdmin => Ok(()),
        }
    }
}

/// Routes reachable without a token
pub fn is_public_route(method: &Method, path: &str) -> bool {
    // Static files and uploads
    if !path.starts_with("/api") {
        return true;
    }

    if matches!(
        path,
        "/api/health"
            | "/api/auth/login"
            | "/api/auth/refresh"
            | "/api/auth/forgot-password"
            | "/api/auth/reset-password"
    ) {
        return true;
    }

    // The catalog is browsable by anyone
    *method == Method::GET && (path == "/api/books" || path.starts_with("/api/books/"))
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_route(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let token = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| bearer_token(&request).map(str::to_string));

    let Some(token) = token else {
        return AppError::Unauthorized("Authentication required".to_string()).into_response();
    };

    match state.tokens.verify(TokenKind::Access, &token) {
        Ok(claims) => {
            request.extensions_mut().insert(CurrentAdmin::from(claims));
            next.run(request).await
        }
        Err(e) => {
            if !matches!(e, TokenError::Expired) {
                tracing::warn!("Rejected access token for {}: {}", request.uri().path(), e);
            }
            AppError::Unauthorized("Invalid or expired token".to_string()).into_response()
        }
    }
}
