use crate::{
    AppState,
    guards::{PROFILE_GUARDS, enforce_guards},
    handlers,
};
use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Every route here expects `require_session_user` to be layered on top by
/// `create_router`, so handlers can take `AuthUser` directly.
pub fn authenticated_routes() -> Router<AppState> {
    let session_routes = Router::<AppState>::new()
        // POST /logout/
        .route("/logout/", post(handlers::logout))
        .route("/dashboard/", get(handlers::dashboard))
        .route("/reports/", get(handlers::reports));

    // Profile and CRM data require an active account.
    let active_routes = Router::<AppState>::new()
        // GET|PATCH|DELETE /profile/
        // Show or edit the caller's profile, or remove the account entirely.
        .route(
            "/profile/",
            get(handlers::show_profile)
                .patch(handlers::update_profile)
                .delete(handlers::remove_account),
        )
        // PATCH /profile/password-update/
        // Requires the current password.
        .route(
            "/profile/password-update/",
            patch(handlers::update_password),
        )
        // GET /api/organizations and /api/contacts
        // Listings are scoped to the caller's accounts and accept the standard filters.
        .route("/api/organizations", get(handlers::list_organizations))
        .route("/api/organizations/{id}", get(handlers::get_organization))
        .route("/api/contacts", get(handlers::list_contacts))
        .route("/api/contacts/{id}", get(handlers::get_contact))
        .route_layer(middleware::from_fn_with_state(
            PROFILE_GUARDS,
            enforce_guards,
        ));

    session_routes.merge(active_routes)
}
