//! Load test of the k6.io demo site homepage.
//!
//! Two scenarios run back to back: `constant_load` holds 10 VUs for 30s, then `ramp_up` ramps
//! 0 → 10 → 20 → 0 VUs over 30s. The run fails when the 95th percentile request duration
//! reaches 500ms or when 10% or more of iterations count as errors.
use stampede::core::{ConfigError, HTTP_REQ_DURATION};
use stampede::prelude::*;
use std::ops::Range;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TARGET: &str = "https://test.k6.io/";
pub const WELCOME_TEXT: &str = "Welcome to the k6.io demo site!";

/// Minimum fraction of checks that must pass for an iteration not to count as an error.
pub const ERROR_TOLERANCE: f64 = 0.6;

/// Responses slower than this fail the response time check.
pub const ACCEPTABLE_RESPONSE_TIME: Duration = Duration::from_millis(1_000);

pub const THINK_TIME: Range<Duration> = Duration::from_secs(2)..Duration::from_secs(5);

pub const ERRORS: &str = "errors";
pub const REQUEST_DURATION: &str = "request_duration";

static ERROR_RATE: Rate = Rate::new(ERRORS);
static REQUEST_DURATION_TREND: Trend = Trend::new(REQUEST_DURATION);

static TARGET: OnceLock<String> = OnceLock::new();

/// Override the URL the `homepage` scenario loads. Only the first call has an effect.
pub fn set_target(url: &str) -> bool {
    let set = TARGET.set(url.to_string()).is_ok();
    if !set {
        warn!("Target already set to {}; ignoring {url}", target());
    }
    set
}

pub fn target() -> &'static str {
    TARGET.get().map(String::as_str).unwrap_or(DEFAULT_TARGET)
}

pub fn options() -> Result<Options, ConfigError> {
    Ok(Options::new()
        .scenario(ScenarioConfig::new(
            "constant_load",
            ExecutorConfig::constant_vus(10, Duration::from_secs(30)),
        ))
        .scenario(
            ScenarioConfig::new(
                "ramp_up",
                ExecutorConfig::ramping_vus(
                    0,
                    vec![
                        Stage::new(Duration::from_secs(10), 10),
                        Stage::new(Duration::from_secs(10), 20),
                        Stage::new(Duration::from_secs(10), 0),
                    ],
                ),
            )
            .start_time(Duration::from_secs(30)),
        )
        .threshold(HTTP_REQ_DURATION, "p(95)<500".parse()?)
        .threshold(ERRORS, "rate<0.1".parse()?))
}

pub fn check_homepage(res: &Response) -> CheckResult {
    Checks::new(res)
        .check("status is 200", |r| r.status == 200)
        .check("page contains title", |r| r.body.contains("<title>"))
        .check("page contains correct content", |r| r.body.contains(WELCOME_TEXT))
        .check("response time is acceptable", |r| {
            r.timings.duration < ACCEPTABLE_RESPONSE_TIME
        })
        .check("content type is correct", |r| {
            r.header(http::CONTENT_TYPE)
                .is_some_and(|ct| ct.contains("text/html"))
        })
        .finish()
}

/// An iteration only counts as an error when fewer than 60% of its checks passed.
pub fn is_error(checks: &CheckResult) -> bool {
    checks.pass_ratio() < ERROR_TOLERANCE
}

/// What a single visit observed.
#[derive(Clone, Debug)]
pub struct Visit {
    pub duration: Duration,
    pub checks: CheckResult,
    pub error: bool,
}

/// Load `url` once, check the response and record the custom metrics.
pub async fn visit(url: &str) -> Visit {
    let res = http::get(url).await;
    let checks = check_homepage(&res);
    let error = is_error(&checks);

    ERROR_RATE.add(error);
    REQUEST_DURATION_TREND.add_duration(res.timings.duration);

    let duration_ms = res.timings.duration.as_secs_f64() * 1_000.;
    info!("Main page response time: {duration_ms:.3}ms");

    Visit {
        duration: res.timings.duration,
        checks,
        error,
    }
}

/// One full VU iteration: a visit followed by think time.
pub async fn iteration(url: &str) -> Visit {
    let visit = visit(url).await;
    think_time(THINK_TIME).await;
    visit
}

#[scenario]
pub async fn homepage() {
    iteration(target()).await;
}
