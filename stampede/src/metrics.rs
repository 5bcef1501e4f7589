//! Custom metrics
//!
//! Metric handles are cheap `const` values meant to live in statics. Samples are recorded into
//! the registry of the test run that owns the current VU and aggregated when the run reports.
//!
//! ```no_run
//! use stampede::prelude::*;
//!
//! static ERRORS: Rate = Rate::new("errors");
//! static LATENCY: Trend = Trend::new("latency");
//!
//! #[scenario]
//! async fn my_scenario() {
//!     let res = http::get("http://localhost:3002/").await;
//!     ERRORS.add(res.status != 200);
//!     LATENCY.add_duration(res.timings.duration);
//! }
//! ```
use crate::context;
use metrics_util::AtomicBucket;
use stampede_core::{Aggregation, CheckSummary, MetricKind, MetricSummary};
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, RwLock,
};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// Cumulative sum of added values.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn add(&self, value: f64) {
        record(self.name, MetricKind::Counter, value);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Last value set, along with its minimum and maximum.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
}

impl Gauge {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn set(&self, value: f64) {
        record(self.name, MetricKind::Gauge, value);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Fraction of samples that were `true`.
#[derive(Debug)]
pub struct Rate {
    name: &'static str,
}

impl Rate {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn add(&self, value: bool) {
        record(self.name, MetricKind::Rate, if value { 1. } else { 0. });
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Distribution of numeric samples.
#[derive(Debug)]
pub struct Trend {
    name: &'static str,
}

impl Trend {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn add(&self, value: f64) {
        record(self.name, MetricKind::Trend, value);
    }

    /// Record a duration in milliseconds.
    pub fn add_duration(&self, duration: Duration) {
        self.add(as_millis_f64(duration));
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub(crate) fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.
}

fn record(name: &'static str, kind: MetricKind, value: f64) {
    if let Some(registry) = context::registry() {
        registry.record(name, kind, value);
    } else {
        warn!("No run registry available. Dropping sample for {name}.");
    }
}

/// Per-run store of every metric sample and check outcome.
#[derive(Default)]
pub(crate) struct Registry {
    sinks: RwLock<BTreeMap<&'static str, Arc<Sink>>>,
    checks: Mutex<Vec<CheckSummary>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &'static str, kind: MetricKind, value: f64) {
        let Some(sink) = self.sink(name, kind) else {
            return;
        };
        sink.record(value);

        #[cfg(feature = "metrics")]
        forward(name, kind, value);
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        self.record(stampede_core::CHECKS, MetricKind::Rate, if passed { 1. } else { 0. });

        let mut checks = lock(&self.checks);
        let idx = match checks.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                checks.push(CheckSummary {
                    name: name.to_string(),
                    passes: 0,
                    fails: 0,
                });
                checks.len() - 1
            }
        };
        if passed {
            checks[idx].passes += 1;
        } else {
            checks[idx].fails += 1;
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|sink| sink.kind())
    }

    /// Aggregate a metric over a run that has been going for `elapsed`.
    ///
    /// `None` when the metric has no samples or does not support the aggregation.
    pub fn aggregate(
        &self,
        name: &str,
        aggregation: &Aggregation,
        elapsed: Duration,
    ) -> Option<f64> {
        let sink = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()?;
        sink.aggregate(aggregation, elapsed)
    }

    pub fn summaries(&self, elapsed: Duration) -> BTreeMap<String, MetricSummary> {
        let sinks: Vec<_> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, sink)| (name.to_string(), sink.clone()))
            .collect();

        sinks
            .into_iter()
            .filter_map(|(name, sink)| sink.summary(elapsed).map(|s| (name, s)))
            .collect()
    }

    pub fn checks(&self) -> Vec<CheckSummary> {
        lock(&self.checks).clone()
    }

    fn sink(&self, name: &'static str, kind: MetricKind) -> Option<Arc<Sink>> {
        let existing = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();

        let sink = match existing {
            Some(sink) => sink,
            None => self
                .sinks
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(name)
                .or_insert_with(|| Arc::new(Sink::new(kind)))
                .clone(),
        };

        if sink.kind() == kind {
            Some(sink)
        } else {
            warn!(
                "Metric {name} is already registered as a {}; dropping {kind} sample.",
                sink.kind()
            );
            None
        }
    }
}

#[cfg(feature = "metrics")]
fn forward(name: &'static str, kind: MetricKind, value: f64) {
    match kind {
        MetricKind::Counter => ::metrics::counter!(name).increment(value.max(0.).round() as u64),
        MetricKind::Gauge => ::metrics::gauge!(name).set(value),
        MetricKind::Rate => {
            let outcome = if value != 0. { "pass" } else { "fail" };
            ::metrics::counter!(name, "outcome" => outcome).increment(1);
        }
        MetricKind::Trend => ::metrics::histogram!(name).record(value),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Sink {
    Counter(Mutex<CounterState>),
    Gauge(Mutex<GaugeState>),
    Rate(RateState),
    Trend(TrendState),
}

#[derive(Default)]
struct CounterState {
    sum: f64,
    samples: u64,
}

struct GaugeState {
    value: f64,
    min: f64,
    max: f64,
}

#[derive(Default)]
struct RateState {
    passes: AtomicU64,
    fails: AtomicU64,
}

struct TrendState {
    pending: AtomicBucket<f64>,
    samples: Mutex<Samples>,
}

impl Sink {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Mutex::default()),
            MetricKind::Gauge => Self::Gauge(Mutex::new(GaugeState {
                value: f64::NAN,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            })),
            MetricKind::Rate => Self::Rate(RateState::default()),
            MetricKind::Trend => Self::Trend(TrendState {
                pending: AtomicBucket::new(),
                samples: Mutex::new(Samples::default()),
            }),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    fn record(&self, value: f64) {
        match self {
            Self::Counter(state) => {
                let mut state = lock(state);
                state.sum += value;
                state.samples += 1;
            }
            Self::Gauge(state) => {
                let mut state = lock(state);
                state.value = value;
                state.min = state.min.min(value);
                state.max = state.max.max(value);
            }
            Self::Rate(state) => {
                if value != 0. {
                    state.passes.fetch_add(1, Ordering::Relaxed);
                } else {
                    state.fails.fetch_add(1, Ordering::Relaxed);
                }
            }
            Self::Trend(state) => state.pending.push(value),
        }
    }

    fn aggregate(&self, aggregation: &Aggregation, elapsed: Duration) -> Option<f64> {
        if !aggregation.supports(self.kind()) {
            return None;
        }

        match self {
            Self::Counter(state) => {
                let state = lock(state);
                if state.samples == 0 {
                    return None;
                }
                match aggregation {
                    Aggregation::Count => Some(state.sum),
                    _ => Some(per_second(state.sum, elapsed)),
                }
            }
            Self::Gauge(state) => {
                let state = lock(state);
                if state.value.is_nan() {
                    return None;
                }
                match aggregation {
                    Aggregation::Min => Some(state.min),
                    Aggregation::Max => Some(state.max),
                    _ => Some(state.value),
                }
            }
            Self::Rate(state) => state.rate(),
            Self::Trend(state) => {
                let mut samples = state.drain();
                if samples.is_empty() {
                    return None;
                }
                let value = match aggregation {
                    Aggregation::Avg => samples.avg(),
                    Aggregation::Min => samples.min,
                    Aggregation::Max => samples.max,
                    Aggregation::Count => samples.count() as f64,
                    Aggregation::Med => samples.percentile(50.),
                    Aggregation::Percentile(p) => samples.percentile(*p),
                    _ => return None,
                };
                Some(value)
            }
        }
    }

    fn summary(&self, elapsed: Duration) -> Option<MetricSummary> {
        let summary = match self {
            Self::Counter(state) => {
                let state = lock(state);
                MetricSummary::Counter {
                    count: state.sum,
                    rate: per_second(state.sum, elapsed),
                }
            }
            Self::Gauge(state) => {
                let state = lock(state);
                if state.value.is_nan() {
                    return None;
                }
                MetricSummary::Gauge {
                    value: state.value,
                    min: state.min,
                    max: state.max,
                }
            }
            Self::Rate(state) => MetricSummary::Rate {
                passes: state.passes.load(Ordering::Relaxed),
                fails: state.fails.load(Ordering::Relaxed),
                rate: state.rate().unwrap_or(0.),
            },
            Self::Trend(state) => {
                let mut samples = state.drain();
                if samples.is_empty() {
                    return None;
                }
                MetricSummary::Trend {
                    avg: samples.avg(),
                    min: samples.min,
                    med: samples.percentile(50.),
                    max: samples.max,
                    p90: samples.percentile(90.),
                    p95: samples.percentile(95.),
                    count: samples.count(),
                }
            }
        };
        Some(summary)
    }
}

impl RateState {
    fn rate(&self) -> Option<f64> {
        let passes = self.passes.load(Ordering::Relaxed);
        let total = passes + self.fails.load(Ordering::Relaxed);
        (total > 0).then(|| passes as f64 / total as f64)
    }
}

impl TrendState {
    /// Move every buffered sample into the retained set.
    fn drain(&self) -> MutexGuard<'_, Samples> {
        let mut samples = lock(&self.samples);
        self.pending.clear_with(|pending| {
            for sample in pending {
                samples.insert(*sample);
            }
        });
        samples
    }
}

/// Every sample of a trend, kept so that percentiles are exact.
struct Samples {
    values: Vec<f64>,
    sorted: bool,
    min: f64,
    max: f64,
    sum: f64,
}

impl Default for Samples {
    fn default() -> Self {
        Self {
            values: vec![],
            sorted: true,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.,
        }
    }
}

impl Samples {
    fn insert(&mut self, value: f64) {
        if !value.is_finite() {
            trace!("Ignoring non-finite trend sample {value}");
            return;
        }
        self.values.push(value);
        self.sorted = false;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn count(&self) -> u64 {
        self.values.len() as u64
    }

    fn avg(&self) -> f64 {
        self.sum / self.values.len() as f64
    }

    /// Linear interpolation between the closest ranks, `pct` in `[0, 100]`.
    fn percentile(&mut self, pct: f64) -> f64 {
        if !self.sorted {
            self.values.sort_unstable_by(f64::total_cmp);
            self.sorted = true;
        }

        let last = self.values.len() - 1;
        let rank = (pct / 100.).clamp(0., 1.) * last as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let low = self.values[lower];
        let high = self.values[upper];
        low + (high - low) * (rank - lower as f64)
    }
}

fn per_second(value: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0. {
        value / secs
    } else {
        value
    }
}
