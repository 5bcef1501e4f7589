mod utils;
use utils::*;

use stampede::core::{MetricSummary, HTTP_REQS, HTTP_REQ_FAILED};
use stampede::prelude::*;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;

#[scenario]
async fn idle() {
    sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn ramping_reaches_peak() {
    let options = Options::new().scenario(ScenarioConfig::new(
        "ramp",
        ExecutorConfig::ramping_vus(
            0,
            vec![
                Stage::new(Duration::from_secs(1), 8),
                Stage::new(Duration::from_secs(1), 0),
            ],
        ),
    ));

    let summary = TestRun::new(options).run(idle()).await.unwrap();
    let ramp = &summary.scenarios[0];
    assert_eq!(ramp.name, "ramp");
    assert_eq!(ramp.max_vus, 8);
    assert!(ramp.iterations > 0);
    assert_eq!(ramp.interrupted_iterations, 0);
}

static STARTED: Mutex<Vec<String>> = Mutex::new(Vec::new());

#[scenario]
async fn record_start() {
    let name = exec::scenario().unwrap();
    {
        let mut started = STARTED.lock().unwrap();
        if !started.contains(&name) {
            started.push(name);
        }
    }
    sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn start_time_orders_scenarios() {
    let options = Options::new()
        .scenario(
            ScenarioConfig::new(
                "second",
                ExecutorConfig::constant_vus(1, Duration::from_millis(500)),
            )
            .start_time(Duration::from_secs(1)),
        )
        .scenario(ScenarioConfig::new(
            "first",
            ExecutorConfig::constant_vus(1, Duration::from_millis(500)),
        ));

    let summary = TestRun::new(options).run(record_start()).await.unwrap();

    assert_eq!(*STARTED.lock().unwrap(), ["first", "second"]);
    assert_eq!(summary.scenarios.len(), 2);
    assert!(summary.elapsed >= Duration::from_millis(1_500));
}

#[scenario]
async fn hammer_limited() {
    http::get(&url("/limited/20")).await;
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn rps_caps_request_rate() {
    let mut options = Options::new().scenario(ScenarioConfig::new(
        "hammer",
        ExecutorConfig::constant_vus(4, Duration::from_secs(2)),
    ));
    options.rps = NonZeroU32::new(10);

    let summary = TestRun::new(options).run(hammer_limited()).await.unwrap();

    let Some(MetricSummary::Counter { count, .. }) = summary.metrics.get(HTTP_REQS) else {
        panic!("no {HTTP_REQS} in summary");
    };
    // One second of burst plus two seconds at the cap.
    assert!(*count > 0. && *count <= 32., "{count} requests");

    // Never fast enough for the service's own limiter to reject anything.
    let Some(MetricSummary::Rate { passes, .. }) = summary.metrics.get(HTTP_REQ_FAILED) else {
        panic!("no {HTTP_REQ_FAILED} in summary");
    };
    assert_eq!(*passes, 0);
}
