use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::config::RateLimitConfig;
use crate::handlers;
use crate::images::LOCAL_URL_PREFIX;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// Room for the three cover files plus the text fields of a book form
const FORM_OVERHEAD: usize = 1024 * 1024;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]),
        Err(e) => {
            tracing::warn!("Invalid CORS origin '{}' ({}), allowing any origin", origin, e);
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

const RATE_LIMITED: &str = "Too many requests from this IP, please try again later.";

/// Hardening headers added to every response that does not set them itself
fn security_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=15552000; includeSubDomains"),
        ),
        (header::X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        (
            HeaderName::from_static("x-permitted-cross-domain-policies"),
            HeaderValue::from_static("none"),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ),
        // Covers are embedded by the frontend's origin
        (
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("cross-origin"),
        ),
    ]
}

/// Give the limiter's 429 the usual JSON envelope, keeping its headers.
async fn rate_limit_envelope(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let (parts, _) = response.into_parts();
    let mut limited = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ApiResponse::<()>::error(RATE_LIMITED)),
    )
        .into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            limited.headers_mut().insert(name.clone(), value.clone());
        }
    }
    limited
}

/// Per-client budget keyed on the forwarded or peer IP.
fn rate_limited(routes: Router<AppState>, limit: &RateLimitConfig) -> Router<AppState> {
    if !limit.enabled {
        return routes;
    }

    let config = GovernorConfigBuilder::default()
        .per_millisecond(limit.replenish_interval_ms())
        .burst_size(limit.max_requests.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .use_headers()
        .finish();

    match config {
        Some(config) => routes
            .layer(GovernorLayer {
                config: Arc::new(config),
            })
            .layer(middleware::map_response(rate_limit_envelope)),
        None => {
            tracing::warn!("Invalid rate limit settings {:?}, requests are not limited", limit);
            routes
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_size.saturating_mul(3) + FORM_OVERHEAD;

    let book_routes = Router::new()
        .route(
            "/",
            get(handlers::book::list_books).post(handlers::book::create_book),
        )
        .route("/filters/options", get(handlers::book::filter_options))
        .route("/report", get(handlers::book::report_books))
        .route("/report/grouped", get(handlers::book::grouped_report))
        .route("/print-list", get(handlers::book::print_list))
        .route(
            "/:id",
            get(handlers::book::get_book)
                .put(handlers::book::update_book)
                .delete(handlers::book::delete_book),
        );

    let faculty_routes = Router::new()
        .route(
            "/",
            get(handlers::faculty::list_faculties).post(handlers::faculty::create_faculty),
        )
        .route("/:id", delete(handlers::faculty::delete_faculty))
        .route("/departments", post(handlers::faculty::create_department))
        .route("/departments/:id", delete(handlers::faculty::delete_department));

    let auth_routes = Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/me", get(handlers::auth::me))
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .route("/reset-password", post(handlers::auth::reset_password));

    let admin_routes = Router::new()
        .route("/dashboard/stats", get(handlers::admin::dashboard_stats))
        .route("/change-password", put(handlers::admin::change_password))
        .route(
            "/sub-admins",
            get(handlers::admin::list_sub_admins).post(handlers::admin::create_sub_admin),
        )
        .route(
            "/sub-admins/:id",
            get(handlers::admin::get_sub_admin).delete(handlers::admin::delete_sub_admin),
        );

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .nest("/books", book_routes)
        .nest("/faculties", faculty_routes)
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes);

    let api_routes = rate_limited(api_routes, &state.config.rate_limit);
    let uploads = ServeDir::new(&state.config.root_dir);

    let mut router = Router::new()
        .nest("/api", api_routes)
        .nest_service(LOCAL_URL_PREFIX, uploads)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origin));
    for (name, value) in security_headers() {
        router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
    }

    router.with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error("Route not found")),
    )
}
