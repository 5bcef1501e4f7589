//! Scenario logic
use crate::context::{RunContext, RUN};
use crate::executors::executor_for;
use crate::timer::Timer;
use crate::vu_pool::VuPool;
use stampede_core::{
    ExecutorConfig, ScenarioConfig, ScenarioStatistics, Stage, CONTROL_INTERVAL,
    DEFAULT_GRACEFUL_RAMP_DOWN,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Load test scenario structure
///
/// Handler for running scenarios. Not intended for manual creation, use the [`#[scenario]`](stampede_macros::scenario) macro which will add these methods to functions.
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = ScenarioStatistics> + Send>>>,
    config: ScenarioConfig,
}

impl<T> Scenario<T> {
    #[doc(hidden)]
    pub fn new(name: &str, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: ScenarioConfig::new(name, ExecutorConfig::default()),
        }
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn() -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = ScenarioStatistics;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let func = this.func.clone();
            let config = this.config.clone();
            Box::pin(async move { run_scenario(func, config).await })
        });
        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn constant_vus(self, vus: usize, duration: Duration) -> Self;
    fn ramping_vus(self, start_vus: usize, stages: Vec<Stage>) -> Self;
    fn start_time(self, offset: Duration) -> Self;
    fn graceful_stop(self, grace: Duration) -> Self;
    fn graceful_ramp_down(self, grace: Duration) -> Self;
    fn config(&self) -> &ScenarioConfig;

    /// Bind the same iteration function to another configuration.
    fn set_config(&self, config: ScenarioConfig) -> Self;
}

impl<T, F> ConfigurableScenario<ScenarioStatistics> for Scenario<T>
where
    T: Fn() -> F + Send + 'static + Clone + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    /// Run a fixed number of VUs for the given duration.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .constant_vus(10, Duration::from_secs(30))
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn constant_vus(mut self, vus: usize, duration: Duration) -> Self {
        self.config.executor = ExecutorConfig::constant_vus(vus, duration);
        self
    }

    /// Ramp the VU count linearly from `start_vus` through each stage's target.
    ///
    /// # Example
    /// ```no_run
    /// use stampede::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .ramping_vus(0, vec![
    ///             Stage::new(Duration::from_secs(10), 10),
    ///             Stage::new(Duration::from_secs(10), 0),
    ///         ])
    ///         .await;
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn ramping_vus(mut self, start_vus: usize, stages: Vec<Stage>) -> Self {
        let graceful_ramp_down = match self.config.executor {
            ExecutorConfig::RampingVus {
                graceful_ramp_down, ..
            } => graceful_ramp_down,
            _ => DEFAULT_GRACEFUL_RAMP_DOWN,
        };
        self.config.executor = ExecutorConfig::RampingVus {
            start_vus,
            stages,
            graceful_ramp_down,
        };
        self
    }

    /// Delay the start of the scenario.
    fn start_time(mut self, offset: Duration) -> Self {
        self.config.start_time = offset;
        self
    }

    /// How long in-flight iterations may run once the scenario ends.
    fn graceful_stop(mut self, grace: Duration) -> Self {
        self.config.graceful_stop = grace;
        self
    }

    /// How long VUs removed by a ramp-down may run. Only applies to ramping scenarios.
    fn graceful_ramp_down(mut self, grace: Duration) -> Self {
        if let ExecutorConfig::RampingVus {
            graceful_ramp_down, ..
        } = &mut self.config.executor
        {
            *graceful_ramp_down = grace;
        } else {
            warn!("graceful_ramp_down has no effect on {}", self.config.name);
        }
        self
    }

    fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    fn set_config(&self, config: ScenarioConfig) -> Self {
        Scenario {
            func: self.func.clone(),
            runner_fut: None,
            config,
        }
    }
}

#[instrument(name = "scenario", skip_all, fields(name = %config.name))]
pub(crate) async fn run_scenario<T, F>(scenario: T, config: ScenarioConfig) -> ScenarioStatistics
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    let run = RUN
        .try_with(|ctx| ctx.clone())
        .unwrap_or_else(|_| RunContext::standalone());

    if !wait_for_start(&run, config.start_time).await {
        info!("Run stopped before {} started", config.name);
        return ScenarioStatistics {
            name: config.name,
            ..Default::default()
        };
    }

    info!("Running {} with config {:?}", config.name, &config);

    let executor = executor_for(&config.executor);
    let mut pool = VuPool::new(scenario, &config.name, run.clone());
    let mut timer = Timer::new(CONTROL_INTERVAL).await;
    let start = Instant::now();

    // NOTE: Targets are only applied on control ticks, so VU changes lag by up to one tick.
    while let Some(target) = executor.target(start.elapsed()) {
        if run.is_stopped() {
            break;
        }

        if target != pool.len() {
            trace!("Adjusting VUs from {} to {target}", pool.len());
        }
        pool.set_vus(target, executor.graceful_ramp_down());
        pool.reap();
        run.record_vus();

        timer.tick().await;
    }

    let grace = if run.is_stopped() {
        Duration::ZERO
    } else {
        config.graceful_stop
    };
    pool.shutdown(grace).await;
    run.record_vus();

    let stats = ScenarioStatistics {
        name: config.name,
        iterations: pool.iterations(),
        interrupted_iterations: pool.interrupted(),
        max_vus: pool.max_vus(),
        elapsed: start.elapsed(),
    };

    info!(
        "Scenario complete: {} iterations ({} interrupted) in {}",
        stats.iterations,
        stats.interrupted_iterations,
        humantime::format_duration(Duration::from_millis(stats.elapsed.as_millis() as u64))
    );

    stats
}

/// Sleep through the start offset. Returns `false` if the run was stopped meanwhile.
async fn wait_for_start(run: &RunContext, offset: Duration) -> bool {
    let deadline = Instant::now() + offset;
    loop {
        if run.is_stopped() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(CONTROL_INTERVAL)).await;
    }
}
