use crate::metrics::Registry;
use governor::DefaultDirectRateLimiter;
use stampede_core::{MetricKind, VUS};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// State shared by every scenario of a single test run.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub registry: Arc<Registry>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub active_vus: Arc<AtomicUsize>,
    next_vu: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(limiter: Option<DefaultDirectRateLimiter>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            limiter: limiter.map(Arc::new),
            active_vus: Arc::new(AtomicUsize::new(0)),
            next_vu: Arc::new(AtomicU64::new(1)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context for a scenario awaited outside of a `TestRun`.
    pub fn standalone() -> Self {
        Self::new(None)
    }

    /// Allocate an id for a new VU. Ids start at 1.
    pub fn next_vu_id(&self) -> u64 {
        self.next_vu.fetch_add(1, Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn record_vus(&self) {
        let vus = self.active_vus.load(Ordering::Relaxed);
        self.registry.record(VUS, MetricKind::Gauge, vus as f64);
    }
}

/// State visible to a single VU task.
#[derive(Clone)]
pub(crate) struct VuContext {
    pub registry: Arc<Registry>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
    pub scenario: Arc<str>,
    pub vu: u64,
}

tokio::task_local! {
    pub(crate) static RUN: RunContext;
    pub(crate) static VU: VuContext;
}

/// Registry of the run owning the current task, if any.
pub(crate) fn registry() -> Option<Arc<Registry>> {
    VU.try_with(|ctx| ctx.registry.clone())
        .or_else(|_| RUN.try_with(|ctx| ctx.registry.clone()))
        .ok()
}

pub(crate) fn limiter() -> Option<Arc<DefaultDirectRateLimiter>> {
    VU.try_with(|ctx| ctx.limiter.clone()).ok().flatten()
}
