//! Whole test runs: every configured scenario plus threshold evaluation.
use crate::context::{RunContext, RUN};
use crate::metrics::Registry;
use crate::scenario::ConfigurableScenario;
use crate::timer::Timer;
use crate::RunError;
use governor::{Quota, RateLimiter};
use stampede_core::{
    ConfigError, MetricKind, Options, RunSummary, ScenarioStatistics, ThresholdOutcome,
    CONTROL_INTERVAL, THRESHOLD_EVAL_INTERVAL,
};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// A test run over a set of [`Options`].
///
/// # Example
/// ```no_run
/// use stampede::prelude::*;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let options = Options::new()
///         .scenario(ScenarioConfig::new(
///             "smoke",
///             ExecutorConfig::constant_vus(2, Duration::from_secs(10)),
///         ))
///         .threshold("http_req_duration", "p(95)<500".parse()?);
///
///     let summary = TestRun::new(options).run(my_scenario()).await?;
///     println!("{summary}");
///     assert!(summary.passed());
///     Ok(())
/// }
///
/// #[scenario]
/// async fn my_scenario() {
///     http::get("http://localhost:3002/").await;
/// }
/// ```
pub struct TestRun {
    options: Options,
    thresholds_enabled: bool,
}

impl TestRun {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            thresholds_enabled: true,
        }
    }

    /// Skip threshold evaluation entirely.
    pub fn no_thresholds(mut self, skip: bool) -> Self {
        self.thresholds_enabled = !skip;
        self
    }

    /// Check the options and that every threshold on a built-in metric fits its kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;

        for (metric, thresholds) in self.options.thresholds.iter() {
            let Some(kind) = MetricKind::builtin(metric) else {
                continue;
            };
            if let Some(t) = thresholds
                .iter()
                .find(|t| !t.expr.aggregation.supports(kind))
            {
                return Err(ConfigError::IncompatibleThreshold {
                    metric: metric.to_string(),
                    kind,
                    threshold: t.source().to_string(),
                });
            }
        }

        Ok(())
    }

    #[instrument(name = "run", skip_all)]
    pub async fn run<S>(self, scenario: S) -> Result<RunSummary, RunError>
    where
        S: ConfigurableScenario<ScenarioStatistics> + 'static,
    {
        self.validate()?;

        let limiter = self.options.rps.map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        let ctx = RunContext::new(limiter);
        let start = Instant::now();

        info!(
            "Starting {} scenario(s): {}",
            self.options.scenarios.len(),
            self.options
                .scenarios
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );

        // Dropping the set aborts every scenario, and with them their VU pools.
        let mut tasks = JoinSet::new();
        for (idx, config) in self.options.scenarios.values().enumerate() {
            let scenario = scenario.set_config(config.clone());
            let run = RUN.scope(ctx.clone(), scenario);
            tasks.spawn(async move { (idx, run.await) });
        }

        let watch_thresholds =
            self.thresholds_enabled && self.options.thresholds.has_abort_on_fail();
        let mut timer = Timer::new(CONTROL_INTERVAL).await;
        let mut since_eval = Duration::ZERO;
        let mut aborted = false;

        let mut finished = Vec::with_capacity(tasks.len());
        while !tasks.is_empty() {
            tokio::select! {
                joined = tasks.join_next() => {
                    if let Some(joined) = joined {
                        let joined = joined.map_err(|e| RunError::ScenarioPanicked(e.to_string()))?;
                        finished.push(joined);
                    }
                    continue;
                }
                elapsed = timer.tick() => since_eval += elapsed,
            }

            if watch_thresholds && !aborted && since_eval >= THRESHOLD_EVAL_INTERVAL {
                since_eval = Duration::ZERO;
                let outcomes = self.evaluate(&ctx.registry, start.elapsed());
                if let Some(failed) = self.abort_trigger(&outcomes) {
                    warn!(
                        "Threshold {} on {} crossed; aborting run",
                        failed.threshold, failed.metric
                    );
                    ctx.stop();
                    aborted = true;
                }
            }
        }

        finished.sort_by_key(|(idx, _)| *idx);
        let scenarios: Vec<_> = finished.into_iter().map(|(_, stats)| stats).collect();

        let elapsed = start.elapsed();
        let thresholds = if self.thresholds_enabled {
            self.evaluate(&ctx.registry, elapsed)
        } else {
            vec![]
        };

        let summary = RunSummary {
            elapsed,
            scenarios,
            metrics: ctx.registry.summaries(elapsed),
            checks: ctx.registry.checks(),
            thresholds,
            aborted,
        };

        if summary.passed() {
            info!("Run complete");
        } else {
            warn!("Run complete with failed thresholds");
        }

        Ok(summary)
    }

    fn evaluate(&self, registry: &Registry, elapsed: Duration) -> Vec<ThresholdOutcome> {
        let mut outcomes = vec![];
        for (metric, thresholds) in self.options.thresholds.iter() {
            let kind = registry.kind_of(metric);
            for threshold in thresholds {
                let expr = &threshold.expr;
                let outcome = match kind {
                    Some(kind) if !expr.aggregation.supports(kind) => {
                        warn!("Threshold {expr} does not apply to {kind} metric {metric}");
                        ThresholdOutcome::unsupported(metric, expr)
                    }
                    Some(_) => ThresholdOutcome::evaluate(
                        metric,
                        expr,
                        registry.aggregate(metric, &expr.aggregation, elapsed),
                    ),
                    None => ThresholdOutcome::evaluate(metric, expr, None),
                };
                trace!(
                    "{metric}: {expr} observed={:?} passed={}",
                    outcome.observed,
                    outcome.passed
                );
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// First failed outcome whose threshold is flagged `abortOnFail`.
    fn abort_trigger<'a>(&self, outcomes: &'a [ThresholdOutcome]) -> Option<&'a ThresholdOutcome> {
        let flags = self
            .options
            .thresholds
            .iter()
            .flat_map(|(_, thresholds)| thresholds.iter().map(|t| t.abort_on_fail));

        outcomes
            .iter()
            .zip(flags)
            .find(|(outcome, abort)| *abort && !outcome.passed)
            .map(|(outcome, _)| outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Rate, Trend};
    use crate::scenario::Scenario;
    use stampede_core::{ExecutorConfig, ScenarioConfig, Threshold};
    use std::sync::atomic::{AtomicU64, Ordering};

    static FLAKY: Rate = Rate::new("flaky");
    static WORK: Trend = Trend::new("work");

    async fn work() {
        WORK.add(10.);
        FLAKY.add(crate::exec::vu().unwrap_or(0) % 2 == 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    fn options() -> Options {
        Options::new().scenario(ScenarioConfig::new(
            "work",
            ExecutorConfig::constant_vus(2, Duration::from_secs(1)),
        ))
    }

    #[tracing_test::traced_test]
    #[tokio::test(start_paused = true)]
    async fn thresholds_decide_outcome() {
        let options = options()
            .threshold("work", "p(95)<20".parse().unwrap())
            .threshold("flaky", "rate<0.1".parse().unwrap());

        let summary = TestRun::new(options)
            .run(Scenario::new("work", work))
            .await
            .unwrap();

        assert_eq!(summary.scenarios.len(), 1);
        assert!(summary.scenarios[0].iterations > 0);
        assert!(!summary.aborted);

        let work: Vec<_> = summary.threshold("work").collect();
        assert!(work[0].passed);
        assert_eq!(work[0].observed, Some(10.));

        // VU ids 1 and 2 put the flaky rate at exactly one half.
        let flaky: Vec<_> = summary.threshold("flaky").collect();
        assert!(!flaky[0].passed);
        assert_eq!(flaky[0].observed, Some(0.5));

        assert!(!summary.passed());
        assert!(logs_contain("Run complete with failed thresholds"));
        assert!(summary.metrics.contains_key("iterations"));
        assert!(summary.metrics.contains_key("vus"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_metric_passes() {
        let options = options().threshold("never_recorded", "count>100".parse().unwrap());
        let summary = TestRun::new(options)
            .run(Scenario::new("work", work))
            .await
            .unwrap();

        let outcome: Vec<_> = summary.threshold("never_recorded").collect();
        assert!(outcome[0].passed);
        assert_eq!(outcome[0].observed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_aggregation_fails() {
        let options = options().threshold("flaky", "p(95)<1".parse().unwrap());
        let summary = TestRun::new(options)
            .run(Scenario::new("work", work))
            .await
            .unwrap();
        assert!(!summary.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn no_thresholds_skips_evaluation() {
        let options = options().threshold("flaky", "rate<0.1".parse().unwrap());
        let summary = TestRun::new(options)
            .no_thresholds(true)
            .run(Scenario::new("work", work))
            .await
            .unwrap();
        assert!(summary.thresholds.is_empty());
        assert!(summary.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_on_fail_stops_early() {
        let options = Options::new()
            .scenario(ScenarioConfig::new(
                "long",
                ExecutorConfig::constant_vus(2, Duration::from_secs(600)),
            ))
            .threshold("flaky", "rate<0.1".parse::<Threshold>().unwrap().abort_on_fail());

        let summary = TestRun::new(options)
            .run(Scenario::new("work", work))
            .await
            .unwrap();

        assert!(summary.aborted);
        assert!(summary.elapsed < Duration::from_secs(10));
        assert!(!summary.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_run_stops_vus() {
        static ITERATIONS: AtomicU64 = AtomicU64::new(0);

        async fn counted() {
            ITERATIONS.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let options = Options::new().scenario(ScenarioConfig::new(
            "endless",
            ExecutorConfig::constant_vus(2, Duration::from_secs(60)),
        ));
        let run = TestRun::new(options).run(Scenario::new("endless", counted));
        assert!(tokio::time::timeout(Duration::from_secs(1), run).await.is_err());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let at_drop = ITERATIONS.load(Ordering::Relaxed);
        assert!(at_drop > 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ITERATIONS.load(Ordering::Relaxed), at_drop);
    }

    #[test]
    fn rejects_incompatible_builtin_threshold() {
        let options = options().threshold("http_req_duration", "rate<0.1".parse().unwrap());
        let err = TestRun::new(options).validate().unwrap_err();
        assert!(matches!(err, ConfigError::IncompatibleThreshold { kind: MetricKind::Trend, .. }));
    }

    #[tokio::test]
    async fn invalid_options_error() {
        let res = TestRun::new(Options::new())
            .run(Scenario::new("work", work))
            .await;
        assert!(matches!(res, Err(RunError::Config(ConfigError::NoScenarios))));
    }
}
