use axum::Router;

use crate::routes::{admin, etf, funds, health, holdings, jobs, portfolios, upload};
use crate::state::AppState;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// §6 HTTP surface, assembled the way the reference backend nests each
/// resource's router under its prefix and applies one shared CORS layer.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.as_bytes().starts_with(b"http://localhost:")
                || origin.as_bytes().starts_with(b"http://127.0.0.1:")
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/portfolios", portfolios::router())
        .nest("/holdings", holdings::router())
        .nest("/funds", funds::router())
        .merge(upload::router())
        .nest("/jobs", jobs::router())
        .nest("/etf", etf::router())
        .nest("/admin", admin::router())
        .with_state(state)
        .layer(cors)
}