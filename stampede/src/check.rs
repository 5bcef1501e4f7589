//! Named boolean assertions
//!
//! Every outcome is recorded as a sample of the built-in `checks` rate and tallied per check
//! name for the end-of-test summary. A failing check never fails the iteration.
use crate::context;

/// Builder that evaluates checks against a single subject.
///
/// # Example
/// ```no_run
/// use stampede::prelude::*;
///
/// # async fn example() {
/// let res = http::get("http://localhost:3002/").await;
/// let result = Checks::new(&res)
///     .check("status is 200", |r| r.status == 200)
///     .check("body is not empty", |r| !r.body.is_empty())
///     .finish();
///
/// if !result.all_passed() {
///     tracing::warn!("{} checks failed", result.failed());
/// }
/// # }
/// ```
pub struct Checks<'a, S> {
    subject: &'a S,
    outcomes: Vec<(String, bool)>,
}

impl<'a, S> Checks<'a, S> {
    pub fn new(subject: &'a S) -> Self {
        Self {
            subject,
            outcomes: vec![],
        }
    }

    pub fn check<P>(mut self, name: &str, predicate: P) -> Self
    where
        P: FnOnce(&S) -> bool,
    {
        let passed = predicate(self.subject);
        if let Some(registry) = context::registry() {
            registry.record_check(name, passed);
        }
        self.outcomes.push((name.to_string(), passed));
        self
    }

    pub fn finish(self) -> CheckResult {
        CheckResult {
            outcomes: self.outcomes,
        }
    }
}

/// Outcomes of one round of checks, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckResult {
    outcomes: Vec<(String, bool)>,
}

impl CheckResult {
    /// Build a result without recording anything.
    pub fn from_outcomes<I, N>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (N, bool)>,
        N: Into<String>,
    {
        Self {
            outcomes: outcomes
                .into_iter()
                .map(|(name, passed)| (name.into(), passed))
                .collect(),
        }
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|(_, passed)| *passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Fraction of checks that passed. An empty result counts as fully passing.
    pub fn pass_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            1.
        } else {
            self.passed() as f64 / self.total() as f64
        }
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|(_, passed)| *passed)
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, passed)| *passed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.outcomes.iter().map(|(name, passed)| (name.as_str(), *passed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_ratio() {
        let result = Checks::new(&7)
            .check("positive", |v| *v > 0)
            .check("even", |v| v % 2 == 0)
            .check("small", |v| *v < 10)
            .finish();

        assert_eq!(result.total(), 3);
        assert_eq!(result.passed(), 2);
        assert_eq!(result.failed(), 1);
        assert!(!result.all_passed());
        assert_eq!(result.get("even"), Some(false));
        assert_eq!(result.get("odd"), None);
        assert!((result.pass_ratio() - 2. / 3.).abs() < f64::EPSILON);

        let names: Vec<_> = result.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["positive", "even", "small"]);
    }

    #[test]
    fn empty_result_passes() {
        let result = CheckResult::default();
        assert_eq!(result.pass_ratio(), 1.);
        assert!(result.all_passed());
    }

    #[test]
    fn from_outcomes_matches_builder() {
        let built = Checks::new(&()).check("a", |_| true).check("b", |_| false).finish();
        let direct = CheckResult::from_outcomes([("a", true), ("b", false)]);
        assert_eq!(built, direct);
    }
}
