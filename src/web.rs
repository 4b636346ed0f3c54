//! HTTP surface: the issuance endpoint, the hand-off redirect to the external
//! login portal, and a liveness probe.
use crate::engine::{Engine, Issuance};
use crate::settings::Settings;
use crate::validate::RawAccessRequest;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Contact forms are tiny; anything bigger is refused before parsing.
pub const MAX_BODY_SIZE: usize = 16 * 1024;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Used when neither proxy header names the client.
pub const FALLBACK_CLIENT_IP: &str = "0.0.0.0";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Engine,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    // Responses and redirect targets carry credentials
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/access", post(access))
        .route("/login-redirect", get(login_redirect))
        .route("/healthz", get(health))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

pub async fn serve(settings: Settings, engine: Engine) -> miette::Result<()> {
    let state = AppState {
        settings: Arc::new(settings),
        engine,
    };

    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let app = router(state);

    tracing::info!(%addr, "Captive portal API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`, else [`FALLBACK_CLIENT_IP`].
/// A header value that is not an IP address counts as absent.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header_ip = |value: Option<&str>| {
        value
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok())
    };

    let forwarded = header_ip(
        headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next()),
    );

    let real_ip = || header_ip(headers.get("x-real-ip").and_then(|h| h.to_str().ok()));

    forwarded
        .or_else(real_ip)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| FALLBACK_CLIENT_IP.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    already_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voucher: Option<String>,
}

impl From<Issuance> for AccessResponse {
    fn from(issuance: Issuance) -> Self {
        match issuance {
            Issuance::AlreadyActive => AccessResponse {
                message: "Your access is already active",
                already_active: true,
                username: None,
                password: None,
                voucher: None,
            },
            Issuance::Issued(credential) => AccessResponse {
                message: "Access granted",
                already_active: false,
                username: Some(credential.username),
                password: Some(credential.password),
                voucher: credential.voucher,
            },
        }
    }
}

async fn access(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RawAccessRequest>, JsonRejection>,
) -> Response {
    let Json(raw) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected access request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Invalid request body" })),
            )
                .into_response();
        }
    };

    let ip = client_ip(&headers);
    match state.engine.issue(&raw, &ip).await {
        Ok(issuance) => Json(AccessResponse::from(issuance)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LoginRedirectQuery {
    username: Option<String>,
    password: Option<String>,
}

/// Forwards issued credentials to the external login portal.
async fn login_redirect(
    State(state): State<AppState>,
    Query(q): Query<LoginRedirectQuery>,
) -> Response {
    let username = q.username.unwrap_or_default();
    let password = q.password.unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Missing or invalid login parameters" })),
        )
            .into_response();
    }

    let query = serde_urlencoded::to_string([
        ("username", username.as_str()),
        ("password", password.as_str()),
    ])
    .unwrap_or_default();
    let target = format!("{}/login?{}", state.settings.login_portal_base(), query);

    Redirect::to(&target).into_response()
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let h = headers(&[
            ("x-forwarded-for", " 203.0.113.9 , 10.0.0.1"),
            ("x-real-ip", "10.0.0.2"),
        ]);
        assert_eq!(client_ip(&h), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip() {
        assert_eq!(client_ip(&headers(&[("x-real-ip", "10.0.0.2")])), "10.0.0.2");
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", ""), ("x-real-ip", "10.0.0.2")])),
            "10.0.0.2"
        );
    }

    #[test]
    fn test_client_ip_rejects_non_addresses() {
        let long = "9".repeat(4096);
        let h = headers(&[("x-forwarded-for", "<script>, 10.0.0.1")]);
        assert_eq!(client_ip(&h), FALLBACK_CLIENT_IP);

        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_str(&long).unwrap());
        h.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(client_ip(&h), "2001:db8::1");
    }

    #[test]
    fn test_client_ip_default() {
        assert_eq!(client_ip(&HeaderMap::new()), FALLBACK_CLIENT_IP);
    }

    #[test]
    fn test_already_active_response_omits_credentials() {
        let value = serde_json::to_value(AccessResponse::from(Issuance::AlreadyActive)).unwrap();
        assert_eq!(value["alreadyActive"], json!(true));
        assert!(value.get("username").is_none());
        assert!(value.get("password").is_none());
        assert!(value.get("voucher").is_none());
    }
}
