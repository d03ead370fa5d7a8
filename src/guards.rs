use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{auth::AuthUser, errors::AppError, models::User};

/// Guard
///
/// An authorization predicate over the resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Active,
    Superuser,
    Verified,
}

/// Guards for routes any signed-in, active user may reach.
pub const PROFILE_GUARDS: &[Guard] = &[Guard::Active];
/// Guards for the administrative users API.
pub const ADMIN_GUARDS: &[Guard] = &[Guard::Active, Guard::Superuser];

impl Guard {
    pub fn message(self) -> &'static str {
        match self {
            Guard::Active => "Your user account is inactive.",
            Guard::Superuser => "Your account does not have enough privileges to access this content.",
            Guard::Verified => "Your account has not been verified.",
        }
    }

    pub fn check(self, user: &User) -> Result<(), AppError> {
        let allowed = match self {
            Guard::Active => user.is_active,
            Guard::Superuser => user.is_superuser,
            Guard::Verified => user.is_verified,
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::AuthorizationDenied(self.message().to_string()))
        }
    }
}

/// Checks `guards` in order; the first failure is returned.
pub fn enforce(guards: &[Guard], user: &User) -> Result<(), AppError> {
    guards.iter().try_for_each(|guard| guard.check(user))
}

/// enforce_guards
///
/// Route-layer middleware. Must sit inside `require_session_user` so the
/// `AuthUser` is already resolved.
pub async fn enforce_guards(
    State(guards): State<&'static [Guard]>,
    AuthUser(user): AuthUser,
    request: Request,
    next: Next,
) -> Response {
    if let Err(denied) = enforce(guards, &user) {
        tracing::info!(user_id = user.id, reason = %denied, "request denied by guard");
        return denied.into_response();
    }
    next.run(request).await
}
