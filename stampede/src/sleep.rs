use rand::Rng;
use std::ops::Range;
use std::time::Duration;

pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Sleep for a duration drawn uniformly from `range`, returning the duration slept.
pub async fn think_time(range: Range<Duration>) -> Duration {
    let duration = think_duration(&mut rand::thread_rng(), range);
    tokio::time::sleep(duration).await;
    duration
}

/// Uniform draw from the half-open `range`. An empty range yields its start.
pub fn think_duration<R: Rng>(rng: &mut R, range: Range<Duration>) -> Duration {
    if range.is_empty() {
        range.start
    } else {
        rng.gen_range(range)
    }
}
