//! Minimal HTTP helper
//!
//! Requests never fail the iteration: transport errors come back as a [`Response`] with
//! status `0`, an empty body, and `error` set, so checks on it simply evaluate to `false`.
use crate::context;
use crate::transaction::{record_transaction, wait_for_limiter};
use reqwest::Client;
use stampede_core::{MetricKind, DATA_RECEIVED, HTTP_LABELS};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

pub use reqwest::header::{self, HeaderMap, HeaderValue, CONTENT_TYPE};
pub use reqwest::Method;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

static CLIENT: OnceLock<Client> = OnceLock::new();

fn client() -> &'static Client {
    CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client ({e}); using defaults.");
                Client::new()
            })
    })
}

#[derive(Clone, Debug)]
pub struct Response {
    pub url: String,
    /// `0` when the request never got a response.
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub timings: Timings,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timings {
    /// From sending the request until the body was fully read.
    pub duration: Duration,
}

impl Response {
    /// Header value as a string, if present and valid UTF-8.
    pub fn header<K: header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A transport error or a status of 400 or above.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || self.status == 0 || self.status >= 400
    }

    fn transport_error(url: &str, duration: Duration, err: reqwest::Error) -> Self {
        Self {
            url: url.to_string(),
            status: 0,
            headers: HeaderMap::new(),
            body: String::new(),
            timings: Timings { duration },
            error: Some(err.to_string()),
        }
    }
}

pub async fn get(url: &str) -> Response {
    request(Method::GET, url).await
}

/// Send a request without headers or body, recording the built-in `http_*` metrics.
pub async fn request(method: Method, url: &str) -> Response {
    wait_for_limiter().await;

    let start = Instant::now();
    let res = send(method, url, start).await;

    if let Some(error) = &res.error {
        debug!("Request to {url} failed: {error}");
    }

    record_transaction(HTTP_LABELS, res.timings.duration, res.is_failed());
    if let Some(registry) = context::registry() {
        registry.record(DATA_RECEIVED, MetricKind::Counter, res.body.len() as f64);
    }

    res
}

async fn send(method: Method, url: &str, start: Instant) -> Response {
    let resp = match client().request(method, url).send().await {
        Ok(resp) => resp,
        Err(err) => return Response::transport_error(url, start.elapsed(), err),
    };

    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let (body, error) = match resp.text().await {
        Ok(body) => (body, None),
        Err(err) => (String::new(), Some(err.to_string())),
    };

    Response {
        url: url.to_string(),
        status,
        headers,
        body,
        timings: Timings {
            duration: start.elapsed(),
        },
        error,
    }
}
