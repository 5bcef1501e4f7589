#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod check;
pub mod exec;
pub mod http;
pub mod metrics;
pub mod run;
pub mod scenario;
pub mod sleep;
#[doc(hidden)]
pub mod transaction;

pub(crate) mod context;
pub(crate) mod executors;
pub(crate) mod timer;
pub(crate) mod vu_pool;

mod error;

pub use error::RunError;
pub use run::TestRun;
pub use scenario::Scenario;
pub use stampede_core as core;
pub use stampede_core::generate_labels;
pub use stampede_macros::{scenario, transaction};

pub mod prelude {
    pub use crate::check::{CheckResult, Checks};
    pub use crate::http::{self, Response};
    pub use crate::metrics::{Counter, Gauge, Rate, Trend};
    pub use crate::scenario::ConfigurableScenario;
    pub use crate::sleep::{sleep, think_time};
    pub use crate::{exec, RunError, TestRun};

    pub use stampede_core::{
        ExecutorConfig, Options, RunSummary, ScenarioConfig, ScenarioStatistics, Stage, Threshold,
    };
    pub use stampede_macros::{scenario, transaction};
}
