//! A small stand-in for the k6.io demo site, used to load test against locally.
use axum::{
    debug_handler,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub const WELCOME_TEXT: &str = "Welcome to the k6.io demo site!";

pub const HOMEPAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Demo website for load testing</title>
</head>
<body>
  <h1>Welcome to the k6.io demo site!</h1>
  <p>This is a replica of the demo site, served locally for load testing.</p>
</body>
</html>
"#;

const MISSING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<body>
  <p>Nothing to see here.</p>
</body>
</html>
"#;

#[derive(Clone, Default)]
struct AppState {
    hits: Arc<AtomicU64>,
    limiters: Arc<RwLock<HashMap<u32, Arc<DefaultDirectRateLimiter>>>>,
}

impl AppState {
    fn hit(&self) {
        counter!("mock-service.requests").increment(1);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }
}

/// All routes, counting every request into `hits`.
///
/// - `/`: the demo homepage
/// - `/status/:code`: an empty plain-text response with the given status
/// - `/plain`: the homepage body served as `text/plain`
/// - `/missing`: an HTML page with neither a title nor the welcome text
/// - `/delay/ms/:delay_ms`: the homepage after a delay
/// - `/limited/:max_rps`: the homepage, or `429` past `max_rps` requests per second
pub fn router(hits: Arc<AtomicU64>) -> Router {
    let state = AppState {
        hits,
        ..Default::default()
    };

    Router::new()
        .route("/", get(homepage))
        .route("/status/:code", get(status))
        .route("/plain", get(plain))
        .route("/missing", get(missing))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/limited/:max_rps", get(limited))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(Arc::default())).await?;
    Ok(())
}

/// A mock service running on its own thread and runtime, so it outlives any single test
/// runtime.
pub struct MockService {
    pub addr: SocketAddr,
    hits: Arc<AtomicU64>,
}

impl MockService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Start a mock service on an ephemeral localhost port.
pub fn spawn() -> anyhow::Result<MockService> {
    let listener = StdTcpListener::bind("127.0.0.1:0")?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicU64::new(0));

    let app = router(hits.clone());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name(format!("mock-service-{}", addr.port()))
        .spawn(move || {
            let res: anyhow::Result<()> = runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener)?;
                axum::serve(listener, app).await?;
                Ok(())
            });
            if let Err(e) = res {
                error!("Mock service on {addr} stopped: {e}");
            }
        })?;

    debug!("Mock service listening on {addr}");
    Ok(MockService { addr, hits })
}

#[debug_handler]
async fn homepage(State(state): State<AppState>) -> Html<&'static str> {
    state.hit();
    Html(HOMEPAGE)
}

#[debug_handler]
async fn status(State(state): State<AppState>, Path(code): Path<u16>) -> Response {
    state.hit();
    match StatusCode::from_u16(code) {
        Ok(status) => (status, [(header::CONTENT_TYPE, "text/plain")], "").into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid status code").into_response(),
    }
}

#[debug_handler]
async fn plain(State(state): State<AppState>) -> impl IntoResponse {
    state.hit();
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], HOMEPAGE)
}

#[debug_handler]
async fn missing(State(state): State<AppState>) -> Html<&'static str> {
    state.hit();
    Html(MISSING_PAGE)
}

#[debug_handler]
async fn delay(State(state): State<AppState>, Path(delay_ms): Path<u64>) -> Html<&'static str> {
    state.hit();
    histogram!("mock-service.delay_ms").record(delay_ms as f64);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    Html(HOMEPAGE)
}

#[debug_handler]
async fn limited(State(state): State<AppState>, Path(max_rps): Path<u32>) -> Response {
    state.hit();
    let Some(max_rps) = NonZeroU32::new(max_rps) else {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    };

    let existing = state
        .limiters
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&max_rps.get())
        .cloned();
    let limiter = match existing {
        Some(limiter) => limiter,
        None => state
            .limiters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(max_rps.get())
            .or_insert_with(|| Arc::new(rate_limiter(max_rps)))
            .clone(),
    };

    match limiter.check() {
        Ok(_) => Html(HOMEPAGE).into_response(),
        Err(_) => {
            counter!("mock-service.limited").increment(1);
            StatusCode::TOO_MANY_REQUESTS.into_response()
        }
    }
}

/** Utils **/

fn rate_limiter(max_rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(max_rps))
}
