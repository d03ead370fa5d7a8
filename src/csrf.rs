use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use sha2::{Digest, Sha256};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{config::AppConfig, errors::AppError};

const CSRF_SESSION_KEY: &str = "_csrf_token";

/// protect
///
/// Synchronizer-token CSRF check. The token lives in the session and is mirrored
/// in a script-readable cookie; requests with unsafe methods must echo it in the
/// configured header. The cookie is refreshed on every response, so a session
/// flushed by the handler receives a new token immediately.
pub async fn protect(
    State(config): State<AppConfig>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    match verify(&config, &session, request.method(), request.uri(), request.headers()).await {
        Ok(()) => {}
        Err(denied) => return denied.into_response(),
    }

    let response = next.run(request).await;

    match ensure_token(&session).await {
        Ok(token) => {
            let cookie = Cookie::build((config.csrf_cookie_name.clone(), token))
                .path("/")
                .same_site(SameSite::Lax)
                .secure(config.csrf_cookie_secure)
                .http_only(false);
            (CookieJar::new().add(cookie), response).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn verify(
    config: &AppConfig,
    session: &Session,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    if is_safe(method) {
        return Ok(());
    }

    let expected = session.get::<String>(CSRF_SESSION_KEY).await?;
    let submitted = headers
        .get(config.csrf_header_name.as_str())
        .and_then(|value| value.to_str().ok());

    match (expected.as_deref(), submitted) {
        (Some(expected), Some(submitted)) if tokens_match(expected, submitted) => Ok(()),
        _ => {
            tracing::warn!(method = %method, uri = %uri, "csrf token mismatch");
            Err(AppError::AuthorizationDenied(
                "CSRF token verification failed".to_string(),
            ))
        }
    }
}

/// Compares fixed-size digests so the time taken does not depend on where the
/// submitted token first differs.
fn tokens_match(expected: &str, submitted: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let submitted = Sha256::digest(submitted.as_bytes());
    expected
        .iter()
        .zip(submitted.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

async fn ensure_token(session: &Session) -> Result<String, AppError> {
    if let Some(token) = session.get::<String>(CSRF_SESSION_KEY).await? {
        return Ok(token);
    }
    let token = Uuid::new_v4().simple().to_string();
    session.insert(CSRF_SESSION_KEY, &token).await?;
    Ok(token)
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
