use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    errors::AppError,
    inertia::SharedProps,
    models::{User, UserSchema},
    repository::RepositoryState,
};

/// Session key holding the authenticated user's email.
pub const SESSION_USER_KEY: &str = "user_id";
/// Shared-props namespace the auth state is published under.
pub const AUTH_NAMESPACE: &str = "auth";

pub const LOGIN_PATH: &str = "/login/";

/// AuthState
///
/// The auth projection shared with the view layer: `{"isAuthenticated": false}`
/// or `{"isAuthenticated": true, "user": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSchema>,
}

impl AuthState {
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            user: None,
        }
    }

    pub fn authenticated(user: UserSchema) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
        }
    }
}

/// SessionAuthenticator
///
/// Resolves the session's user reference to an identity through the repository
/// and publishes the resulting `AuthState`. Inactive users resolve to no
/// identity even when their record exists. Nothing is written to the session.
#[derive(Clone)]
pub struct SessionAuthenticator {
    repo: RepositoryState,
}

impl SessionAuthenticator {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn current_user(
        &self,
        session: &Session,
        shared: &SharedProps,
    ) -> Result<Option<User>, AppError> {
        let Some(email) = session.get::<String>(SESSION_USER_KEY).await? else {
            publish(shared, &AuthState::anonymous())?;
            return Ok(None);
        };

        match self.repo.get_user_by_email(&email).await? {
            Some(user) if user.is_active => {
                let accounts = self.repo.get_user_accounts(user.id).await?;
                let schema = UserSchema::from_user(&user, accounts);
                publish(shared, &AuthState::authenticated(schema))?;
                Ok(Some(user))
            }
            Some(user) => {
                tracing::debug!(user_id = user.id, "session user is inactive");
                publish(shared, &AuthState::anonymous())?;
                Ok(None)
            }
            None => {
                tracing::debug!("session user no longer exists");
                publish(shared, &AuthState::anonymous())?;
                Ok(None)
            }
        }
    }
}

fn publish(shared: &SharedProps, state: &AuthState) -> Result<(), AppError> {
    shared.share(AUTH_NAMESPACE, serde_json::to_value(state)?);
    Ok(())
}

/// Starts an authenticated session for `user` under a fresh session id.
pub async fn login(session: &Session, user: &User) -> Result<(), AppError> {
    session.cycle_id().await?;
    session.insert(SESSION_USER_KEY, &user.email).await?;
    Ok(())
}

/// Drops every session value, including the user reference.
pub async fn logout(session: &Session) -> Result<(), AppError> {
    session.flush().await?;
    Ok(())
}

/// AuthUser Extractor
///
/// The identity resolved by `require_session_user`. Only available on routes
/// behind that middleware; elsewhere it rejects with `NotAuthenticated`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::NotAuthenticated)
    }
}

/// CurrentUser Extractor
///
/// Runs the `SessionAuthenticator` for the request (or reuses the identity
/// resolved by `require_session_user`). `None` when nobody is signed in.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(AuthUser(user)) = parts.extensions.get::<AuthUser>() {
            return Ok(CurrentUser(Some(user.clone())));
        }

        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer is not installed".to_string()))?;
        let shared = parts
            .extensions
            .get::<SharedProps>()
            .cloned()
            .unwrap_or_default();

        let authenticator = SessionAuthenticator::new(RepositoryState::from_ref(state));
        let user = authenticator.current_user(&session, &shared).await?;
        Ok(CurrentUser(user))
    }
}

/// require_session_user
///
/// Route-layer middleware for every protected route. Resolves the session user
/// and stores it as `AuthUser` in the request extensions. Without one, API
/// requests get `401` and page requests are redirected to the login page.
pub async fn require_session_user(
    CurrentUser(user): CurrentUser,
    mut request: Request,
    next: Next,
) -> Response {
    match user {
        Some(user) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        None if request.uri().path().starts_with("/api") => {
            AppError::NotAuthenticated.into_response()
        }
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}
