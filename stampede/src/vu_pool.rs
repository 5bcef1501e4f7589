use crate::context::{RunContext, VuContext, VU};
use crate::metrics::as_millis_f64;
use stampede_core::{MetricKind, ITERATIONS, ITERATION_DURATION};
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Set of VU tasks looping a single scenario function.
pub(crate) struct VuPool<T> {
    scenario: T,
    name: Arc<str>,
    run: RunContext,
    vus: Vec<Vu>,
    retiring: Vec<Retiring>,
    iterations: Arc<AtomicU64>,
    interrupted: u64,
    max_vus: usize,
}

struct Vu {
    id: u64,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A VU that was asked to stop and has until `deadline` to finish its iteration.
struct Retiring {
    vu: Vu,
    deadline: Instant,
}

impl<T, F> VuPool<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(scenario: T, name: &str, run: RunContext) -> Self {
        Self {
            scenario,
            name: Arc::from(name),
            run,
            vus: vec![],
            retiring: vec![],
            iterations: Arc::new(AtomicU64::new(0)),
            interrupted: 0,
            max_vus: 0,
        }
    }

    /// Grow or shrink to `count` looping VUs. Removed VUs get `grace` to finish.
    pub fn set_vus(&mut self, count: usize, grace: Duration) {
        self.vus.retain(|vu| {
            let alive = !vu.handle.is_finished();
            if !alive {
                error!("VU {} exited unexpectedly; replacing it.", vu.id);
            }
            alive
        });

        if self.vus.len() > count {
            let deadline = Instant::now() + grace;
            for vu in self.vus.drain(count..) {
                vu.stop.store(true, Ordering::Relaxed);
                self.retiring.push(Retiring { vu, deadline });
            }
        } else {
            while self.vus.len() < count {
                let vu = self.spawn();
                self.vus.push(vu);
            }
        }

        self.max_vus = self.max_vus.max(self.vus.len());
    }

    /// Forget retired VUs that finished and abort the ones whose grace expired.
    pub fn reap(&mut self) {
        let now = Instant::now();
        let mut interrupted = 0;
        self.retiring.retain(|r| {
            if r.vu.handle.is_finished() {
                false
            } else if r.deadline <= now {
                trace!("Interrupting VU {}", r.vu.id);
                r.vu.handle.abort();
                interrupted += 1;
                false
            } else {
                true
            }
        });
        self.interrupted += interrupted;
    }

    /// Stop every VU, waiting up to `grace` for in-flight iterations.
    pub async fn shutdown(&mut self, grace: Duration) {
        self.set_vus(0, grace);

        for Retiring { vu, deadline } in std::mem::take(&mut self.retiring) {
            let mut handle = vu.handle;
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                trace!("Interrupting VU {}", vu.id);
                handle.abort();
                self.interrupted += 1;
            }
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn interrupted(&self) -> u64 {
        self.interrupted
    }

    pub fn max_vus(&self) -> usize {
        self.max_vus
    }

    pub fn len(&self) -> usize {
        self.vus.len()
    }

    fn spawn(&self) -> Vu {
        let id = self.run.next_vu_id();
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = VuContext {
            registry: self.run.registry.clone(),
            limiter: self.run.limiter.clone(),
            scenario: self.name.clone(),
            vu: id,
        };

        let scenario = self.scenario.clone();
        let registry = self.run.registry.clone();
        let iterations = self.iterations.clone();
        let active = ActiveGuard::new(self.run.active_vus.clone());
        let task_stop = stop.clone();

        let handle = tokio::spawn(VU.scope(ctx, async move {
            let _active = active;
            while !task_stop.load(Ordering::Relaxed) {
                let start = Instant::now();
                scenario().await;
                let elapsed = start.elapsed();

                iterations.fetch_add(1, Ordering::Relaxed);
                registry.record(ITERATIONS, MetricKind::Counter, 1.);
                registry.record(ITERATION_DURATION, MetricKind::Trend, as_millis_f64(elapsed));
            }
        }));

        Vu { id, stop, handle }
    }
}

impl<T> Drop for VuPool<T> {
    fn drop(&mut self) {
        for vu in self.vus.iter().chain(self.retiring.iter().map(|r| &r.vu)) {
            vu.handle.abort();
        }
    }
}

/// Counts a VU as live for as long as its task exists.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
