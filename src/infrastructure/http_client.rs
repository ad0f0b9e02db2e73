//! HTTP request client for the engine and cloud backends.
//!
//! Every call resolves to an [`Envelope`]; transport failures, non-2xx
//! statuses and unparsable bodies are normalized into failed envelopes instead
//! of errors.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{AppConfig, Backend, Envelope, TokenCell};

/// Error code for requests that exceeded the timeout.
pub const TIMEOUT_CODE: &str = "timeout";
/// Error code for requests that never reached the backend.
pub const NETWORK_CODE: &str = "network";
/// Error code for 2xx responses whose body could not be decoded.
pub const INVALID_RESPONSE_CODE: &str = "invalid_response";

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Do not attach the bearer token (login, refresh).
    pub skip_auth: bool,
    /// Override the configured timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options for unauthenticated calls.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            skip_auth: true,
            timeout: None,
        }
    }
}

/// Shared HTTP client; cheap to clone.
#[derive(Debug, Clone)]
pub struct RequestClient {
    http: reqwest::Client,
    engine_base: String,
    cloud_base: String,
    timeout: Duration,
    token: TokenCell,
}

impl RequestClient {
    /// Build a client from configuration and the shared session token.
    #[must_use]
    pub fn new(config: &AppConfig, token: TokenCell) -> Self {
        Self {
            http: reqwest::Client::new(),
            engine_base: config.api_base(Backend::Engine),
            cloud_base: config.api_base(Backend::Cloud),
            timeout: config.request_timeout(),
            token,
        }
    }

    /// Absolute URL of `path` on `backend`.
    #[must_use]
    pub fn url(&self, backend: Backend, path: &str) -> String {
        let base = match backend {
            Backend::Engine => &self.engine_base,
            Backend::Cloud => &self.cloud_base,
        };
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Attach the bearer token, if one is held.
    #[must_use]
    pub fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Shared session token cell.
    #[must_use]
    pub const fn token(&self) -> &TokenCell {
        &self.token
    }

    /// Underlying reqwest client, for streaming calls.
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Issue a request and normalize the outcome.
    pub async fn request<T: DeserializeOwned>(
        &self,
        backend: Backend,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Envelope<T> {
        let url = self.url(backend, path);
        let timeout = options.timeout.unwrap_or(self.timeout);

        let mut builder = self.http.request(method.clone(), &url).timeout(timeout);
        if !options.skip_auth {
            builder = self.authorize(builder);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        debug!(%method, %url, "Sending request");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return transport_failure(&e, timeout),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return transport_failure(&e, timeout),
        };

        debug!(%method, %url, status = status.as_u16(), "Received response");
        normalize(status, &bytes)
    }

    /// `GET` helper.
    pub async fn get<T: DeserializeOwned>(&self, backend: Backend, path: &str) -> Envelope<T> {
        self.request(backend, Method::GET, path, None, RequestOptions::default())
            .await
    }

    /// `POST` helper with a JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        backend: Backend,
        path: &str,
        body: &impl Serialize,
    ) -> Envelope<T> {
        self.send_json(backend, Method::POST, path, body, RequestOptions::default())
            .await
    }

    /// `PUT` helper with a JSON body.
    pub async fn put<T: DeserializeOwned>(
        &self,
        backend: Backend,
        path: &str,
        body: &impl Serialize,
    ) -> Envelope<T> {
        self.send_json(backend, Method::PUT, path, body, RequestOptions::default())
            .await
    }

    /// `DELETE` helper.
    pub async fn delete<T: DeserializeOwned>(&self, backend: Backend, path: &str) -> Envelope<T> {
        self.request(backend, Method::DELETE, path, None, RequestOptions::default())
            .await
    }

    /// Serialize `body` and send it with `method`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        backend: Backend,
        method: Method,
        path: &str,
        body: &impl Serialize,
        options: RequestOptions,
    ) -> Envelope<T> {
        match serde_json::to_value(body) {
            Ok(value) => self.request(backend, method, path, Some(value), options).await,
            Err(e) => Envelope::fail_with_code(format!("invalid request body: {e}"), "invalid_request"),
        }
    }

    /// `GET` an absolute URL and report whether it answered with a 2xx status
    /// within `timeout`.
    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.http.get(url).timeout(timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(%url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

fn transport_failure<T>(err: &reqwest::Error, timeout: Duration) -> Envelope<T> {
    if err.is_timeout() {
        Envelope::fail_with_code(
            format!("request timed out after {}ms", timeout.as_millis()),
            TIMEOUT_CODE,
        )
    } else {
        Envelope::fail_with_code(format!("network error: {err}"), NETWORK_CODE)
    }
}

fn string_field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

/// Map a status code and raw body to an envelope.
pub(crate) fn normalize<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> Envelope<T> {
    let parsed: Option<Value> = if bytes.iter().all(u8::is_ascii_whitespace) {
        Some(Value::Null)
    } else {
        serde_json::from_slice(bytes).ok()
    };

    if !status.is_success() {
        let body = parsed.unwrap_or(Value::Null);
        let message = string_field(&body, &["error", "message", "detail"])
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string);
        let code = string_field(&body, &["error_code", "code"])
            .map_or_else(|| format!("http_{}", status.as_u16()), str::to_string);
        return Envelope::fail_with_code(message, code);
    }

    let Some(body) = parsed else {
        return Envelope::fail_with_code("invalid response", INVALID_RESPONSE_CODE);
    };

    if body.get("success").is_some_and(Value::is_boolean) {
        return match serde_json::from_value::<Envelope<T>>(body) {
            Ok(mut envelope) => {
                if !envelope.success && envelope.error.is_none() {
                    envelope.error = Some("Unknown error".to_string());
                }
                envelope
            }
            Err(_) => Envelope::fail_with_code("invalid response", INVALID_RESPONSE_CODE),
        };
    }

    if body.is_null() {
        return Envelope {
            success: true,
            data: serde_json::from_value(Value::Null).ok(),
            error: None,
            error_code: None,
        };
    }

    match serde_json::from_value::<T>(body) {
        Ok(data) => Envelope::ok(data),
        Err(_) => Envelope::fail_with_code("invalid response", INVALID_RESPONSE_CODE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthResponse, Workflow};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_ms: u64) -> (RequestClient, TokenCell) {
        let mut config = AppConfig::default();
        config.backends.engine_url = server.uri();
        config.backends.cloud_url = server.uri();
        config.http.timeout_ms = timeout_ms;
        let token = TokenCell::default();
        (RequestClient::new(&config, token.clone()), token)
    }

    #[test]
    fn test_normalize_wraps_plain_body() {
        let env: Envelope<Vec<String>> = normalize(StatusCode::OK, br#"["a","b"]"#);
        assert_eq!(env, Envelope::ok(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_normalize_keeps_envelope_body() {
        let env: Envelope<Value> =
            normalize(StatusCode::OK, br#"{"success":false,"error":"quota exceeded"}"#);
        assert!(!env.success);
        assert_eq!(env.error.as_deref(), Some("quota exceeded"));

        let bare: Envelope<Value> = normalize(StatusCode::OK, br#"{"success":false}"#);
        assert_eq!(bare.error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn test_normalize_error_statuses() {
        let env: Envelope<Value> =
            normalize(StatusCode::UNAUTHORIZED, br#"{"detail":"token expired"}"#);
        assert_eq!(env.error.as_deref(), Some("token expired"));
        assert_eq!(env.error_code.as_deref(), Some("http_401"));

        let html: Envelope<Value> = normalize(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert_eq!(html.error.as_deref(), Some("HTTP 502"));
        assert_eq!(html.error_code.as_deref(), Some("http_502"));
    }

    #[test]
    fn test_normalize_unparsable_success() {
        let env: Envelope<Workflow> = normalize(StatusCode::OK, b"not json");
        assert_eq!(env.error.as_deref(), Some("invalid response"));

        let wrong_shape: Envelope<Workflow> = normalize(StatusCode::OK, br#"{"id":1}"#);
        assert_eq!(wrong_shape.error_code.as_deref(), Some(INVALID_RESPONSE_CODE));
    }

    #[test]
    fn test_normalize_empty_body() {
        let env: Envelope<Value> = normalize(StatusCode::NO_CONTENT, b"");
        assert!(env.success);
        assert!(env.into_ack().is_ok());
    }

    #[tokio::test]
    async fn test_login_server_error_becomes_failed_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, 1_000);
        let env: Envelope<AuthResponse> = client
            .send_json(
                Backend::Cloud,
                Method::POST,
                "/auth/login",
                &json!({"identifier": "a", "password": "b"}),
                RequestOptions::anonymous(),
            )
            .await;

        assert!(!env.success);
        assert_eq!(env.error.as_deref(), Some("boom"));
        assert_eq!(env.error_code.as_deref(), Some("http_500"));
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engine/workflows"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let (client, token) = client_for(&server, 1_000);
        token.set(Some("abc".into()));
        let env: Envelope<Vec<Workflow>> = client.get(Backend::Engine, "/workflows").await;
        assert_eq!(env, Envelope::ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_skip_auth_omits_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .and(|req: &Request| !req.headers.contains_key("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "new"})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, token) = client_for(&server, 1_000);
        token.set(Some("old".into()));
        let env: Envelope<Value> = client
            .request(
                Backend::Cloud,
                Method::POST,
                "/auth/refresh",
                Some(json!({"refreshToken": "r"})),
                RequestOptions::anonymous(),
            )
            .await;
        assert!(env.success);
    }

    #[tokio::test]
    async fn test_timeout_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/engine/system/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let (client, _) = client_for(&server, 50);
        let env: Envelope<Value> = client.get(Backend::Engine, "/system/status").await;
        assert_eq!(env.error.as_deref(), Some("request timed out after 50ms"));
        assert_eq!(env.error_code.as_deref(), Some(TIMEOUT_CODE));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_failure() {
        let mut config = AppConfig::default();
        config.backends.engine_url = "http://127.0.0.1:1".to_string();
        let client = RequestClient::new(&config, TokenCell::default());

        let env: Envelope<Value> = client.get(Backend::Engine, "/workflows").await;
        assert!(!env.success);
        assert_eq!(env.error_code.as_deref(), Some(NETWORK_CODE));
    }

    #[test]
    fn test_url_resolution() {
        let mut config = AppConfig::default();
        config.backends.cloud_url = "https://cloud.example/".to_string();
        let client = RequestClient::new(&config, TokenCell::default());
        assert_eq!(
            client.url(Backend::Cloud, "/auth/login"),
            "https://cloud.example/api/v1/auth/login"
        );
        assert_eq!(
            client.url(Backend::Engine, "tools"),
            "http://localhost:8000/engine/tools"
        );
    }
}
