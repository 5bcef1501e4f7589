use crate::ThresholdExpr;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Statistics for a single scenario run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScenarioStatistics {
    pub name: String,
    /// Iterations that ran to completion.
    pub iterations: u64,
    /// Iterations aborted because a grace window expired.
    pub interrupted_iterations: u64,
    pub max_vus: usize,
    #[serde(with = "secs_f64")]
    pub elapsed: Duration,
}

/// Aggregated view of one metric at the end of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSummary {
    Counter {
        count: f64,
        /// Per second over the run's elapsed time.
        rate: f64,
    },
    Gauge {
        value: f64,
        min: f64,
        max: f64,
    },
    Rate {
        passes: u64,
        fails: u64,
        rate: f64,
    },
    Trend {
        avg: f64,
        min: f64,
        med: f64,
        max: f64,
        p90: f64,
        p95: f64,
        count: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub threshold: String,
    /// `None` when the metric never received a sample.
    pub observed: Option<f64>,
    pub passed: bool,
}

impl ThresholdOutcome {
    /// Evaluate `expr` against an observed aggregate. No samples means nothing was violated.
    pub fn evaluate(metric: &str, expr: &ThresholdExpr, observed: Option<f64>) -> Self {
        Self {
            metric: metric.to_string(),
            threshold: expr.to_string(),
            observed,
            passed: observed.map_or(true, |v| expr.holds(v)),
        }
    }

    pub fn unsupported(metric: &str, expr: &ThresholdExpr) -> Self {
        Self {
            metric: metric.to_string(),
            threshold: expr.to_string(),
            observed: None,
            passed: false,
        }
    }
}

/// End-of-test summary for a whole run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    #[serde(with = "secs_f64")]
    pub elapsed: Duration,
    pub scenarios: Vec<ScenarioStatistics>,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    /// Set when an `abortOnFail` threshold stopped the run early.
    pub aborted: bool,
}

impl RunSummary {
    /// True iff every evaluated threshold passed.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn threshold(&self, metric: &str) -> impl Iterator<Item = &ThresholdOutcome> {
        let metric = metric.to_string();
        self.thresholds.iter().filter(move |t| t.metric == metric)
    }
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter { count, rate } => write!(f, "{count} {rate:.2}/s"),
            Self::Gauge { value, min, max } => write!(f, "value={value} min={min} max={max}"),
            Self::Rate {
                passes,
                fails,
                rate,
            } => write!(
                f,
                "{:.2}% {passes} out of {}",
                rate * 100.,
                passes + fails
            ),
            Self::Trend {
                avg,
                min,
                med,
                max,
                p90,
                p95,
                ..
            } => write!(
                f,
                "avg={avg:.2} min={min:.2} med={med:.2} max={max:.2} p(90)={p90:.2} p(95)={p95:.2}"
            ),
        }
    }
}

impl RunSummary {
    fn checks_table(&self) -> Table {
        let mut table = summary_table(["", "check", "passes", "fails"]);
        for check in &self.checks {
            let mark = if check.fails == 0 { "✓" } else { "✗" };
            table.add_row(vec![
                mark.to_string(),
                check.name.clone(),
                check.passes.to_string(),
                check.fails.to_string(),
            ]);
        }
        table
    }

    fn metrics_table(&self) -> Table {
        let mut table = summary_table(["", "metric", "summary"]);
        for (name, summary) in &self.metrics {
            let mark = match (
                self.threshold(name).next().is_some(),
                self.threshold(name).any(|t| !t.passed),
            ) {
                (false, _) => "",
                (true, false) => "✓",
                (true, true) => "✗",
            };
            table.add_row(vec![mark.to_string(), name.clone(), summary.to_string()]);
        }
        table
    }

    fn scenarios_table(&self) -> Table {
        let mut table =
            summary_table(["scenario", "iterations", "interrupted", "max VUs", "elapsed"]);
        for s in &self.scenarios {
            table.add_row(vec![
                s.name.clone(),
                s.iterations.to_string(),
                s.interrupted_iterations.to_string(),
                s.max_vus.to_string(),
                humantime::format_duration(Duration::from_millis(s.elapsed.as_millis() as u64))
                    .to_string(),
            ]);
        }
        table
    }

    fn thresholds_table(&self) -> Table {
        let mut table = summary_table(["", "metric", "threshold", "observed"]);
        for t in &self.thresholds {
            table.add_row(vec![
                if t.passed { "✓" } else { "✗" }.to_string(),
                t.metric.clone(),
                t.threshold.clone(),
                t.observed
                    .map(|v| format!("{v:.2}"))
                    .unwrap_or_else(|| "no samples".to_string()),
            ]);
        }
        table
    }
}

fn summary_table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.to_vec());
    table
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.checks.is_empty() {
            writeln!(f, "{}", self.checks_table())?;
        }
        writeln!(f, "{}", self.metrics_table())?;
        if !self.scenarios.is_empty() {
            writeln!(f, "{}", self.scenarios_table())?;
        }
        if !self.thresholds.is_empty() {
            writeln!(f, "{}", self.thresholds_table())?;
        }
        if self.aborted {
            writeln!(f, "run aborted by a threshold")?;
        }
        Ok(())
    }
}

mod secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
