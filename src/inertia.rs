//! Minimal Inertia protocol adapter.
//!
//! Pages are rendered as a page object `{component, props, url, version}`:
//! JSON for Inertia visits (`X-Inertia: true`), an HTML shell carrying the same
//! object in `data-page` otherwise. Props merge shared props, flash messages and
//! the page's own props, in that order of precedence (page props win).

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header::VARY, request::Parts},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_sessions::Session;

use crate::{config::AppConfig, errors::AppError};

pub const X_INERTIA: &str = "x-inertia";
pub const X_INERTIA_VERSION: &str = "x-inertia-version";
pub const X_INERTIA_LOCATION: &str = "x-inertia-location";

const FLASH_SESSION_KEY: &str = "_messages";

/// SharedProps
///
/// Request-scoped props published by middleware and extractors (for example the
/// `auth` namespace) and merged into whatever page the handler renders.
#[derive(Clone, Default, Debug)]
pub struct SharedProps(Arc<Mutex<Map<String, Value>>>);

impl SharedProps {
    pub fn share(&self, namespace: &str, payload: Value) {
        self.0.lock().insert(namespace.to_string(), payload);
    }

    pub fn get(&self, namespace: &str) -> Option<Value> {
        self.0.lock().get(namespace).cloned()
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.0.lock().clone()
    }
}

impl<S> FromRequestParts<S> for SharedProps
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SharedProps>()
            .cloned()
            .unwrap_or_default())
    }
}

/// share_props
///
/// Installs an empty `SharedProps` for the request. Inertia GET visits made with
/// a stale asset version are answered with `409` and `X-Inertia-Location` so the
/// client performs a full reload.
pub async fn share_props(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let is_inertia = headers.contains_key(X_INERTIA);
    let stale = headers
        .get(X_INERTIA_VERSION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|version| version != config.asset_version);

    if is_inertia && stale && request.method() == Method::GET {
        let location = request.uri().to_string();
        tracing::debug!(%location, "inertia asset version changed");
        let mut response = StatusCode::CONFLICT.into_response();
        if let Ok(value) = HeaderValue::from_str(&location) {
            response.headers_mut().insert(X_INERTIA_LOCATION, value);
        }
        return response;
    }

    request.extensions_mut().insert(SharedProps::default());
    next.run(request).await
}

/// FlashMessage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlashMessage {
    pub message: String,
    pub category: String,
}

/// Queues a flash message for the next rendered page.
pub async fn flash(session: &Session, message: &str, category: &str) -> Result<(), AppError> {
    let mut messages: Vec<FlashMessage> =
        session.get(FLASH_SESSION_KEY).await?.unwrap_or_default();
    messages.push(FlashMessage {
        message: message.to_string(),
        category: category.to_string(),
    });
    session.insert(FLASH_SESSION_KEY, messages).await?;
    Ok(())
}

/// Removes queued flash messages, grouped by category.
pub async fn take_flash(session: &Session) -> Result<Map<String, Value>, AppError> {
    let messages: Vec<FlashMessage> = session
        .remove(FLASH_SESSION_KEY)
        .await?
        .unwrap_or_default();

    let mut grouped = Map::new();
    for FlashMessage { message, category } in messages {
        let entry = grouped
            .entry(category)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::String(message));
        }
    }
    Ok(grouped)
}

/// Inertia Extractor
///
/// Captures what a handler needs to render a page: whether the visit is an
/// Inertia request, the request URL, the asset settings, the shared props and
/// the session (for flash messages).
pub struct Inertia {
    is_inertia: bool,
    url: String,
    version: String,
    asset_url: String,
    app_name: String,
    shared: SharedProps,
    session: Option<Session>,
}

impl<S> FromRequestParts<S> for Inertia
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        Ok(Self {
            is_inertia: parts.headers.contains_key(X_INERTIA),
            url,
            version: config.asset_version,
            asset_url: config.asset_url,
            app_name: config.app_name,
            shared: parts
                .extensions
                .get::<SharedProps>()
                .cloned()
                .unwrap_or_default(),
            session: parts.extensions.get::<Session>().cloned(),
        })
    }
}

impl Inertia {
    /// Builds the page object for `component` with the merged props.
    pub async fn page(&self, component: &str, props: impl Serialize) -> Result<Value, AppError> {
        let mut merged = self.shared.snapshot();

        if let Some(session) = &self.session {
            merged.insert("flash".to_string(), Value::Object(take_flash(session).await?));
        }

        match serde_json::to_value(props)? {
            Value::Object(page_props) => merged.extend(page_props),
            Value::Null => {}
            other => {
                merged.insert("content".to_string(), other);
            }
        }

        Ok(json!({
            "component": component,
            "props": merged,
            "url": self.url,
            "version": self.version,
        }))
    }

    /// Renders `component` as an Inertia response or as the HTML shell.
    pub async fn render(&self, component: &str, props: impl Serialize) -> Result<Response, AppError> {
        let page = self.page(component, props).await?;

        if self.is_inertia {
            let mut headers = HeaderMap::new();
            headers.insert(X_INERTIA, HeaderValue::from_static("true"));
            headers.insert(VARY, HeaderValue::from_static("X-Inertia"));
            return Ok((headers, Json(page)).into_response());
        }

        let data_page = escape_attribute(&serde_json::to_string(&page)?);
        let html = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<script type="module" src="{asset_url}main.js"></script>
</head>
<body>
<div id="app" data-page="{data_page}"></div>
</body>
</html>"#,
            title = escape_attribute(&self.app_name),
            asset_url = self.asset_url,
        );
        Ok(Html(html).into_response())
    }
}

fn escape_attribute(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
