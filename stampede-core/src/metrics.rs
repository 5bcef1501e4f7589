use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four kinds of metric a run can accumulate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Cumulative sum of added values.
    Counter,
    /// Last value set, along with the observed minimum and maximum.
    Gauge,
    /// Fraction of non-zero samples.
    Rate,
    /// Distribution of samples (min, max, average, percentiles).
    Trend,
}

impl MetricKind {
    /// Kind of a metric the engine records on its own, if `name` is one of them.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            HTTP_REQS | DATA_RECEIVED | ITERATIONS => Some(Self::Counter),
            HTTP_REQ_DURATION | ITERATION_DURATION => Some(Self::Trend),
            HTTP_REQ_FAILED | CHECKS => Some(Self::Rate),
            VUS => Some(Self::Gauge),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Rate => "rate",
            Self::Trend => "trend",
        };
        f.write_str(name)
    }
}

/// Metric names a transaction records into.
#[derive(Copy, Clone, Debug)]
pub struct TransactionLabels {
    /// Trend of the transaction's wall time, in milliseconds.
    pub duration: &'static str,
    /// Rate of failed (`Err`) transactions.
    pub failed: &'static str,
    /// Counter of transactions.
    pub count: &'static str,
}

/// Labels used by the HTTP helper.
pub const HTTP_LABELS: TransactionLabels = TransactionLabels {
    duration: HTTP_REQ_DURATION,
    failed: HTTP_REQ_FAILED,
    count: HTTP_REQS,
};

#[macro_export]
macro_rules! generate_labels {
    ($base_name:expr) => {
        ::stampede::core::TransactionLabels {
            duration: concat!(stringify!($base_name), "_duration"),
            failed: concat!(stringify!($base_name), "_failed"),
            count: concat!(stringify!($base_name), "_count"),
        }
    };
}
