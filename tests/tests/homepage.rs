mod utils;
use utils::*;

use homepage_test::{visit, ERRORS, REQUEST_DURATION};
use stampede::core::{MetricSummary, HTTP_REQ_DURATION, HTTP_REQ_FAILED, ITERATIONS};
use stampede::prelude::*;
use std::sync::Mutex;
use std::time::Duration;

/// Two VUs visiting `path` for two seconds, judged by the homepage thresholds.
fn short_run(name: &str) -> Options {
    let mut options = Options::new().scenario(ScenarioConfig::new(
        name,
        ExecutorConfig::constant_vus(2, Duration::from_secs(2)),
    ));
    options.thresholds = homepage_test::options().unwrap().thresholds;
    options
}

fn rate(summary: &RunSummary, name: &str) -> (u64, u64) {
    match summary.metrics.get(name) {
        Some(MetricSummary::Rate { passes, fails, .. }) => (*passes, *fails),
        other => panic!("{name} is not a rate: {other:?}"),
    }
}

fn count(summary: &RunSummary, name: &str) -> u64 {
    match summary.metrics.get(name) {
        Some(MetricSummary::Trend { count, .. }) => *count,
        Some(MetricSummary::Counter { count, .. }) => *count as u64,
        other => panic!("{name} has no count: {other:?}"),
    }
}

fn threshold_passed(summary: &RunSummary, metric: &str) -> bool {
    summary.threshold(metric).all(|t| t.passed)
}

#[scenario]
async fn healthy_page() {
    visit(&url("/")).await;
    sleep(Duration::from_millis(100)).await;
}

#[scenario]
async fn server_error() {
    visit(&url("/status/500")).await;
    sleep(Duration::from_millis(100)).await;
}

#[scenario]
async fn plain_text_page() {
    visit(&url("/plain")).await;
    sleep(Duration::from_millis(100)).await;
}

#[scenario]
async fn missing_content() {
    visit(&url("/missing")).await;
    sleep(Duration::from_millis(100)).await;
}

#[scenario]
async fn slow_page() {
    visit(&url("/delay/ms/1100")).await;
}

#[scenario]
async fn unreachable() {
    // Nothing listens on the local discard port.
    visit("http://127.0.0.1:9/").await;
    sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn healthy_run_has_no_errors() {
    let summary = TestRun::new(short_run("healthy"))
        .run(healthy_page())
        .await
        .unwrap();

    assert!(summary.passed(), "{summary}");
    let (errors, ok) = rate(&summary, ERRORS);
    assert_eq!(errors, 0);
    assert!(ok > 0);

    // Exactly one duration sample per completed iteration.
    let iterations = count(&summary, ITERATIONS);
    assert_eq!(summary.scenarios[0].interrupted_iterations, 0);
    assert_eq!(count(&summary, REQUEST_DURATION), iterations);
    assert_eq!(count(&summary, HTTP_REQ_DURATION), iterations);
    assert!(summary.checks.iter().all(|c| c.fails == 0));
    assert_eq!(summary.checks.len(), 5);
    assert!(mock().hits() >= iterations);
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn server_errors_fail_the_run() {
    let summary = TestRun::new(short_run("server_error"))
        .run(server_error())
        .await
        .unwrap();

    let (errors, ok) = rate(&summary, ERRORS);
    assert!(errors > 0);
    assert_eq!(ok, 0);
    assert!(!threshold_passed(&summary, ERRORS));
    assert!(!summary.passed());

    let (failed, _) = rate(&summary, HTTP_REQ_FAILED);
    assert_eq!(failed, count(&summary, REQUEST_DURATION));
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn wrong_content_type_is_tolerated() {
    let summary = TestRun::new(short_run("plain"))
        .run(plain_text_page())
        .await
        .unwrap();

    assert_eq!(rate(&summary, ERRORS).0, 0);
    let content_type = summary
        .checks
        .iter()
        .find(|c| c.name == "content type is correct")
        .unwrap();
    assert_eq!(content_type.passes, 0);
    assert!(content_type.fails > 0);
    assert!(summary.passed());
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn three_of_five_is_not_an_error() {
    let summary = TestRun::new(short_run("missing"))
        .run(missing_content())
        .await
        .unwrap();

    for check in &summary.checks {
        match check.name.as_str() {
            "page contains title" | "page contains correct content" => assert_eq!(check.passes, 0),
            _ => assert_eq!(check.fails, 0),
        }
    }
    assert_eq!(rate(&summary, ERRORS).0, 0);
    assert!(threshold_passed(&summary, ERRORS));
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn slow_responses_break_latency_threshold() {
    let summary = TestRun::new(short_run("slow"))
        .run(slow_page())
        .await
        .unwrap();

    assert_eq!(rate(&summary, ERRORS).0, 0);
    assert!(threshold_passed(&summary, ERRORS));
    assert!(!threshold_passed(&summary, HTTP_REQ_DURATION));
    assert!(!summary.passed());
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn transport_failures_count_as_errors() {
    let summary = TestRun::new(short_run("unreachable"))
        .run(unreachable())
        .await
        .unwrap();

    let (errors, ok) = rate(&summary, ERRORS);
    assert!(errors > 0);
    assert_eq!(ok, 0);

    let (failed, succeeded) = rate(&summary, HTTP_REQ_FAILED);
    assert!(failed > 0);
    assert_eq!(succeeded, 0);
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn metrics_are_forwarded() {
    TestRun::new(short_run("forwarded"))
        .run(healthy_page())
        .await
        .unwrap();

    let rendered = rendered_metrics();
    assert!(rendered.contains("http_reqs"));
    assert!(rendered.contains("request_duration"));
}

static DELAYED_VISITS: Mutex<Vec<Duration>> = Mutex::new(Vec::new());

#[scenario]
async fn single_delayed_visit() {
    let visit = visit(&url("/delay/ms/250")).await;
    DELAYED_VISITS.lock().unwrap().push(visit.duration);
    // Outlasts the scenario so the VU only ever runs one iteration.
    sleep(Duration::from_millis(1_500)).await;
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn duration_sample_is_response_timing() {
    let options = Options::new().scenario(ScenarioConfig::new(
        "single_visit",
        ExecutorConfig::constant_vus(1, Duration::from_millis(500)),
    ));

    let summary = TestRun::new(options)
        .run(single_delayed_visit())
        .await
        .unwrap();

    let visits = DELAYED_VISITS.lock().unwrap().clone();
    assert_eq!(visits.len(), 1);
    let timing_ms = visits[0].as_secs_f64() * 1_000.;
    assert!(timing_ms >= 250.);

    let Some(MetricSummary::Trend {
        min, max, count, ..
    }) = summary.metrics.get(REQUEST_DURATION)
    else {
        panic!("no {REQUEST_DURATION} in summary");
    };
    assert_eq!(*count, 1);
    assert_eq!(*min, timing_ms);
    assert_eq!(*max, timing_ms);
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;

    /// The full 60s profile against the local mock service.
    #[tokio::test]
    #[ntest::timeout(180_000)]
    async fn full_profile() {
        homepage_test::set_target(&url("/"));

        let summary = TestRun::new(homepage_test::options().unwrap())
            .run(homepage_test::homepage())
            .await
            .unwrap();

        println!("{summary}");
        assert!(summary.passed());
        assert_eq!(summary.scenarios.len(), 2);

        let ramp = summary
            .scenarios
            .iter()
            .find(|s| s.name == "ramp_up")
            .unwrap();
        assert!(ramp.max_vus >= 19);
        assert_eq!(rate(&summary, ERRORS).0, 0);
        assert!(serde_json::to_string(&summary).is_ok());
    }
}
