use crate::context::{self, VU};
use crate::metrics::as_millis_f64;
use stampede_core::{MetricKind, TransactionLabels};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Transaction hook used by the `#[transaction]` macro. Not intended to be used manually.
pub async fn transaction_hook<T, R, E>(labels: TransactionLabels, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    if VU.try_with(|_| ()).is_err() {
        tracing::warn!("No hook available.");
        return func.await;
    }

    wait_for_limiter().await;

    let start = Instant::now();
    let res = func.await;
    record_transaction(labels, start.elapsed(), res.is_err());

    res
}

pub(crate) async fn wait_for_limiter() {
    if let Some(limiter) = context::limiter() {
        limiter.until_ready().await;
    }
}

pub(crate) fn record_transaction(labels: TransactionLabels, elapsed: Duration, failed: bool) {
    if let Some(registry) = context::registry() {
        registry.record(labels.duration, MetricKind::Trend, as_millis_f64(elapsed));
        registry.record(labels.count, MetricKind::Counter, 1.);
        registry.record(labels.failed, MetricKind::Rate, if failed { 1. } else { 0. });
    }
}
