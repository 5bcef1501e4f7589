use crate::executors::Executor;
use std::time::Duration;

pub(crate) struct ConstantVus {
    vus: usize,
    duration: Duration,
}

impl ConstantVus {
    pub fn new(vus: usize, duration: Duration) -> Self {
        Self { vus, duration }
    }
}

impl Executor for ConstantVus {
    fn target(&self, elapsed: Duration) -> Option<usize> {
        (elapsed < self.duration).then_some(self.vus)
    }

    fn graceful_ramp_down(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_until_duration() {
        let exec = ConstantVus::new(10, Duration::from_secs(30));
        assert_eq!(exec.target(Duration::ZERO), Some(10));
        assert_eq!(exec.target(Duration::from_millis(29_999)), Some(10));
        assert_eq!(exec.target(Duration::from_secs(30)), None);
    }
}
