use std::time::Duration;

/// Default window given to in-flight iterations once a scenario ends.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Default window given to VUs removed while a `ramping-vus` scenario scales down.
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// Duration used by scenarios that were never given an executor.
pub const DEFAULT_SCENARIO_DURATION: Duration = Duration::from_secs(10);

/// How often a scenario re-reads its executor target.
pub const CONTROL_INTERVAL: Duration = Duration::from_millis(100);

/// How often a running test re-evaluates its thresholds.
pub const THRESHOLD_EVAL_INTERVAL: Duration = Duration::from_secs(2);

/// Exit code used by runners when one or more thresholds failed.
pub const THRESHOLDS_FAILED_EXIT_CODE: u8 = 99;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const DATA_RECEIVED: &str = "data_received";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const VUS: &str = "vus";
