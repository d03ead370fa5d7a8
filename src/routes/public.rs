use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Landing redirect, health check and the login/registration pages. The login
/// and registration handlers redirect visitors who already hold a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Redirects to the dashboard or the login page.
        .route("/", get(handlers::home))
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route(
            "/login/",
            get(handlers::show_login).post(handlers::login),
        )
        .route(
            "/register/",
            get(handlers::show_register).post(handlers::register),
        )
}
