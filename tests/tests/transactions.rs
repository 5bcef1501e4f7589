mod utils;
use utils::*;

use stampede::core::MetricSummary;
use stampede::prelude::*;
use std::time::Duration;

#[transaction]
async fn load_page(path: &str) -> anyhow::Result<()> {
    let res = http::get(&url(path)).await;
    if res.is_failed() {
        anyhow::bail!("{} returned {}", res.url, res.status);
    }
    Ok(())
}

#[scenario]
async fn mixed_pages() {
    let _ = load_page("/").await;
    let _ = load_page("/status/503").await;
    sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn transaction_records_labels() {
    let options = Options::new()
        .scenario(ScenarioConfig::new(
            "mixed",
            ExecutorConfig::constant_vus(2, Duration::from_secs(1)),
        ))
        .threshold("load_page_failed", "rate<0.9".parse().unwrap());

    let summary = TestRun::new(options).run(mixed_pages()).await.unwrap();

    let Some(MetricSummary::Counter { count, .. }) = summary.metrics.get("load_page_count") else {
        panic!("no load_page_count in summary");
    };
    let Some(MetricSummary::Rate { passes, fails, .. }) = summary.metrics.get("load_page_failed")
    else {
        panic!("no load_page_failed in summary");
    };
    assert_eq!(*count as u64, passes + fails);
    assert_eq!(passes, fails);

    assert!(matches!(
        summary.metrics.get("load_page_duration"),
        Some(MetricSummary::Trend { .. })
    ));
    assert!(summary.passed());
}
