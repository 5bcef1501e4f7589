mod constant;
mod ramping;

pub(crate) use constant::ConstantVus;
pub(crate) use ramping::RampingVus;

use stampede_core::ExecutorConfig;
use std::time::Duration;

/// Decides how many VUs a scenario should be running at a point in time.
pub(crate) trait Executor: Send {
    /// Target VU count `elapsed` after the scenario started, or `None` once it is done.
    fn target(&self, elapsed: Duration) -> Option<usize>;

    /// How long a VU removed by a ramp-down may finish its iteration.
    fn graceful_ramp_down(&self) -> Duration;
}

pub(crate) fn executor_for(config: &ExecutorConfig) -> Box<dyn Executor> {
    match config {
        ExecutorConfig::ConstantVus { vus, duration } => {
            Box::new(ConstantVus::new(*vus, *duration))
        }
        ExecutorConfig::RampingVus {
            start_vus,
            stages,
            graceful_ramp_down,
        } => Box::new(RampingVus::new(*start_vus, stages.clone(), *graceful_ramp_down)),
    }
}
