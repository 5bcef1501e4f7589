use crate::executors::Executor;
use stampede_core::Stage;
use std::time::Duration;

/// Linear interpolation between stage targets.
///
/// Within a stage the count is truncated toward the value the stage started from, so it only
/// reaches the stage target at the very end of the stage.
pub(crate) struct RampingVus {
    start_vus: usize,
    stages: Vec<Stage>,
    graceful_ramp_down: Duration,
}

impl RampingVus {
    pub fn new(start_vus: usize, stages: Vec<Stage>, graceful_ramp_down: Duration) -> Self {
        Self {
            start_vus,
            stages,
            graceful_ramp_down,
        }
    }
}

impl Executor for RampingVus {
    fn target(&self, elapsed: Duration) -> Option<usize> {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let into = (elapsed - stage_start).as_nanos() as i128;
                let delta = stage.target as i128 - from as i128;
                // Integer division truncates toward zero, i.e. toward `from`.
                let step = delta * into / stage.duration.as_nanos() as i128;
                return Some((from as i128 + step) as usize);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        None
    }

    fn graceful_ramp_down(&self) -> Duration {
        self.graceful_ramp_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::DEFAULT_GRACEFUL_RAMP_DOWN;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp_up() -> RampingVus {
        RampingVus::new(
            0,
            vec![
                Stage::new(secs(10), 10),
                Stage::new(secs(10), 20),
                Stage::new(secs(10), 0),
            ],
            DEFAULT_GRACEFUL_RAMP_DOWN,
        )
    }

    #[test]
    fn follows_stages() {
        let exec = ramp_up();
        assert_eq!(exec.target(secs(0)), Some(0));
        assert_eq!(exec.target(secs(5)), Some(5));
        assert_eq!(exec.target(secs(10)), Some(10));
        assert_eq!(exec.target(secs(15)), Some(15));
        assert_eq!(exec.target(secs(20)), Some(20));
        assert_eq!(exec.target(secs(25)), Some(10));
        assert_eq!(exec.target(secs(30)), None);
        assert_eq!(exec.target(secs(31)), None);
    }

    #[test]
    fn truncates_toward_stage_start() {
        let exec = ramp_up();
        assert_eq!(exec.target(Duration::from_millis(1_999)), Some(1));
        assert_eq!(exec.target(Duration::from_millis(9_999)), Some(9));
        // Ramping down rounds up, back toward the higher starting value.
        assert_eq!(exec.target(Duration::from_millis(20_001)), Some(20));
        assert_eq!(exec.target(Duration::from_millis(29_999)), Some(1));
    }

    #[test]
    fn zero_length_stage_jumps() {
        let exec = RampingVus::new(
            2,
            vec![Stage::new(Duration::ZERO, 8), Stage::new(secs(4), 8)],
            Duration::ZERO,
        );
        assert_eq!(exec.target(secs(0)), Some(8));
        assert_eq!(exec.target(secs(3)), Some(8));
        assert_eq!(exec.target(secs(4)), None);
    }
}
