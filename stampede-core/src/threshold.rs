//! Threshold expressions
//!
//! A threshold is a pass/fail condition over one aggregate of a metric, written as
//! `<aggregation> <operator> <value>`, e.g. `p(95)<500` or `rate<0.1`.
use crate::{MetricKind, ThresholdParseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which aggregate of a metric a threshold is compared against.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Aggregation {
    Count,
    Rate,
    Value,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `[0, 100]`.
    Percentile(f64),
}

impl Aggregation {
    /// Whether a metric of the given kind can produce this aggregate.
    pub fn supports(&self, kind: MetricKind) -> bool {
        use Aggregation::*;
        match kind {
            MetricKind::Counter => matches!(self, Count | Rate),
            MetricKind::Gauge => matches!(self, Value | Min | Max),
            MetricKind::Rate => matches!(self, Rate),
            MetricKind::Trend => {
                matches!(self, Avg | Min | Max | Med | Count | Percentile(_))
            }
        }
    }
}

impl FromStr for Aggregation {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let aggregation = match s {
            "count" => Self::Count,
            "rate" => Self::Rate,
            "value" => Self::Value,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "med" => Self::Med,
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ThresholdParseError::UnknownAggregation(s.to_string()))?;
                let percentile: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| ThresholdParseError::InvalidPercentile(s.to_string()))?;
                if !(0.0..=100.0).contains(&percentile) {
                    return Err(ThresholdParseError::InvalidPercentile(s.to_string()));
                }
                Self::Percentile(percentile)
            }
        };
        Ok(aggregation)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Value => f.write_str("value"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// A parsed `<aggregation> <operator> <value>` expression.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub value: f64,
}

impl ThresholdExpr {
    pub fn holds(&self, observed: f64) -> bool {
        self.comparison.holds(observed, self.value)
    }
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let missing = || ThresholdParseError::MissingOperator(s.to_string());

        let idx = s
            .find(|c| matches!(c, '<' | '>' | '=' | '!'))
            .ok_or_else(missing)?;
        let (lhs, rest) = s.split_at(idx);

        // NOTE: Two-character operators must be matched before their one-character prefixes
        let (comparison, rhs) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(op, cmp)| rest.strip_prefix(op).map(|rhs| (cmp, rhs)))
        .ok_or_else(missing)?;

        let aggregation = lhs.parse()?;
        let rhs = rhs.trim();
        let value: f64 = rhs
            .parse()
            .map_err(|_| ThresholdParseError::InvalidValue(rhs.to_string()))?;
        if !value.is_finite() {
            return Err(ThresholdParseError::InvalidValue(rhs.to_string()));
        }

        Ok(Self {
            aggregation,
            comparison,
            value,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.aggregation,
            self.comparison.symbol(),
            self.value
        )
    }
}

/// A threshold as written by the user, with its parsed expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold", into = "RawThreshold")]
pub struct Threshold {
    pub expr: ThresholdExpr,
    /// Stop the whole run as soon as this threshold fails.
    pub abort_on_fail: bool,
    source: String,
}

impl Threshold {
    pub fn abort_on_fail(mut self) -> Self {
        self.abort_on_fail = true;
        self
    }

    /// The expression text this threshold was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn holds(&self, observed: f64) -> bool {
        self.expr.holds(observed)
    }
}

impl FromStr for Threshold {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            expr: s.parse()?,
            abort_on_fail: false,
            source: s.trim().to_string(),
        })
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Expr(String),
    Detailed {
        threshold: String,
        #[serde(default, rename = "abortOnFail")]
        abort_on_fail: bool,
    },
}

impl TryFrom<RawThreshold> for Threshold {
    type Error = ThresholdParseError;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        match raw {
            RawThreshold::Expr(expr) => expr.parse(),
            RawThreshold::Detailed {
                threshold,
                abort_on_fail,
            } => {
                let mut parsed: Threshold = threshold.parse()?;
                parsed.abort_on_fail = abort_on_fail;
                Ok(parsed)
            }
        }
    }
}

impl From<Threshold> for RawThreshold {
    fn from(threshold: Threshold) -> Self {
        if threshold.abort_on_fail {
            RawThreshold::Detailed {
                threshold: threshold.source,
                abort_on_fail: true,
            }
        } else {
            RawThreshold::Expr(threshold.source)
        }
    }
}

/// Thresholds keyed by the metric they apply to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdSet(BTreeMap<String, Vec<Threshold>>);

impl ThresholdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a threshold to the list kept for `metric`.
    pub fn insert(&mut self, metric: &str, threshold: Threshold) {
        self.0.entry(metric.to_string()).or_default().push(threshold);
    }

    pub fn get(&self, metric: &str) -> Option<&[Threshold]> {
        self.0.get(metric).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Threshold])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn has_abort_on_fail(&self) -> bool {
        self.0.values().flatten().any(|t| t.abort_on_fail)
    }
}
