//! Information about the currently executing VU.
use crate::context::VU;

/// Name of the scenario the current VU belongs to.
pub fn scenario() -> Option<String> {
    VU.try_with(|ctx| ctx.scenario.to_string()).ok()
}

/// Id of the current VU, unique within its test run.
pub fn vu() -> Option<u64> {
    VU.try_with(|ctx| ctx.vu).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_outside_vu() {
        assert_eq!(scenario(), None);
        assert_eq!(vu(), None);
    }
}
