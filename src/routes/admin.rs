use crate::{
    AppState,
    guards::{ADMIN_GUARDS, enforce_guards},
    handlers,
};
use axum::{Router, middleware, routing::get};

/// Admin Router Module
///
/// User management for superusers. Guards run in declaration order, so an
/// inactive superuser is rejected with the inactive-account message.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET|POST /api/users
        // Filtered, paginated listing and administrative creation.
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // GET|PATCH|DELETE /api/users/{email}
        .route(
            "/api/users/{email}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(ADMIN_GUARDS, enforce_guards))
}
