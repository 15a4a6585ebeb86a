//! HTTP transport seam.
//!
//! Provider clients and market-data providers never talk to `reqwest`
//! directly; they go through the [`HttpTransport`] trait so tests can inject
//! call-counting fakes and the process can share one connection pool.
//!
//! A transport only moves bytes. It reports a [`TransportError`] when no HTTP
//! response was obtained at all; every response that did arrive (any status
//! code) is returned as an [`HttpResponse`] for the caller to classify.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;
use crate::types::HttpMethod;

/// Default bounded timeout for one outbound call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A fully prepared outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL without the query string.
    pub url: String,
    /// Pre-encoded query string (no leading `?`), empty if none.
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// A bare `GET` with the default timeout.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: String::new(),
            headers: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL including the query string.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            self.url.clone()
        } else {
            format!("{}?{}", self.url, self.query)
        }
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, headers: HashMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves one request over the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// Wrap an already-configured client (proxy, TLS roots, ...).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.full_url();
        debug!("[transport] {} {}", request.method, request.url);

        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), &url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.header("Content-Type", "application/json").body(body);
        }

        let resp = builder.send().await.map_err(|e| map_reqwest_error(e, request.timeout))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_ascii_lowercase(), v.to_string())))
            .collect();
        let body = resp.text().await.map_err(|e| map_reqwest_error(e, request.timeout))?;

        Ok(HttpResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn full_url_appends_query() {
        let req = HttpRequest::get("https://api.example.com/v1/x").with_query("a=1&b=2");
        assert_eq!(req.full_url(), "https://api.example.com/v1/x?a=1&b=2");
        assert_eq!(HttpRequest::get("https://h/p").full_url(), "https://h/p");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse::new(429, "").with_header("Retry-After", "3");
        assert_eq!(resp.header("retry-after"), Some("3"));
        assert_eq!(resp.header("RETRY-AFTER"), Some("3"));
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn reqwest_transport_sends_headers_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/account"))
            .and(query_param("timestamp", "1"))
            .and(header("X-MBX-APIKEY", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new();
        let mut req = HttpRequest::get(format!("{}/api/v3/account", server.uri())).with_query("timestamp=1");
        req.headers.push(("X-MBX-APIKEY".into(), "key".into()));

        let resp = transport.execute(req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn reqwest_transport_returns_error_statuses_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let resp = ReqwestTransport::new().execute(HttpRequest::get(server.uri())).await.unwrap();
        assert_eq!(resp.status, 429);
        assert_eq!(resp.header("retry-after"), Some("7"));
    }

    #[tokio::test]
    async fn reqwest_transport_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let req = HttpRequest::get(server.uri()).with_timeout(Duration::from_millis(50));
        let err = ReqwestTransport::new().execute(req).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(50));
    }
}
