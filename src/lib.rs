use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue},
    middleware,
};
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore, cookie::SameSite};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod cli;
pub mod config;
pub mod crypt;
pub mod csrf;
pub mod errors;
pub mod filters;
pub mod guards;
pub mod handlers;
pub mod inertia;
pub mod models;
pub mod repository;
pub mod services;

// Routing segregated by access level (public, session, admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::SessionAuthenticator;
pub use config::AppConfig;
pub use crypt::CredentialVerifier;
pub use errors::AppError;
pub use repository::{PostgresRepository, RepositoryState};
pub use services::UserService;

/// ApiDoc
///
/// OpenAPI document for the JSON API, served at `/schema/openapi.json` and
/// browsable at `/schema/swagger`. Page routes are not part of it.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_users, handlers::get_user, handlers::create_user,
        handlers::update_user, handlers::delete_user,
        handlers::list_organizations, handlers::get_organization,
        handlers::list_contacts, handlers::get_contact,
    ),
    components(
        schemas(
            models::UserSchema, models::AccountAssignment, models::UserCreate,
            models::UserUpdate, models::Organization, models::Contact,
            models::ContactDetail, models::Message, filters::SortOrder,
        )
    ),
    tags(
        (name = "users", description = "User administration"),
        (name = "crm", description = "Organizations and contacts")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container for request handlers: the repository, the loaded
/// configuration and the credential verifier built from it. Services are
/// constructed from these on demand.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
    pub crypt: CredentialVerifier,
}

impl AppState {
    /// Builds the state, deriving the Argon2 parameters from `config`.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Result<Self, AppError> {
        let crypt = CredentialVerifier::from_config(&config)?;
        Ok(Self {
            repo,
            config,
            crypt,
        })
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.repo.clone(), self.crypt.clone())
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for CredentialVerifier {
    fn from_ref(app_state: &AppState) -> CredentialVerifier {
        app_state.crypt.clone()
    }
}

/// create_router
///
/// Assembles the route groups and the middleware stack. From the inside out:
/// guards, session authentication (route layers), CSRF, shared props, the
/// session manager, request-id and tracing, CORS.
pub fn create_router<Store>(state: AppState, store: Store) -> Router
where
    Store: SessionStore + Clone,
{
    let config = state.config.clone();

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session_user,
        ));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/schema/swagger").url("/schema/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    let sessions = SessionManagerLayer::new(store)
        .with_secure(config.session_cookie_secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            config.session_max_age,
        )));

    base_router
        .layer(middleware::from_fn_with_state(config.clone(), csrf::protect))
        .layer(middleware::from_fn_with_state(
            config.clone(),
            inertia::share_props,
        ))
        .layer(sessions)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors_layer(&config))
}

/// CORS from `ALLOWED_CORS_ORIGINS`; `*` allows any origin.
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_cors_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// trace_span_logger
///
/// Builds the per-request span, tagged with the `x-request-id` set by
/// `SetRequestIdLayer`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
