//! Property results and the checker trait.

use crate::counterexample::Counterexample;

/// Outcome of checking a single named property.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Property name (e.g. `NoLostItems`)
    pub name: String,
    /// Where the property is defined (model or invariant module)
    pub source: String,
    /// Ordinal of the property within its source, for stable reporting
    pub line: u32,
    /// Whether the property held
    pub holds: bool,
    /// Violation description, if any
    pub message: Option<String>,
    /// Failure path, if one was recorded
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A property that held.
    #[must_use]
    pub fn pass(name: &str, source: &str, line: u32) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            line,
            holds: true,
            message: None,
            counterexample: None,
        }
    }

    /// A violated property.
    #[must_use]
    pub fn fail(
        name: &str,
        source: &str,
        line: u32,
        message: String,
        counterexample: Option<Counterexample>,
    ) -> Self {
        debug_assert!(!message.is_empty(), "Violation needs a message");
        Self {
            name: name.to_string(),
            source: source.to_string(),
            line,
            holds: false,
            message: Some(message),
            counterexample,
        }
    }

    /// One-line summary, `PASS`/`FAIL` prefixed.
    #[must_use]
    pub fn format(&self) -> String {
        match &self.message {
            None => format!("[PASS] {} ({}#{})", self.name, self.source, self.line),
            Some(msg) => format!(
                "[FAIL] {} ({}#{}): {}",
                self.name, self.source, self.line, msg
            ),
        }
    }
}

/// Something that can check a set of properties.
pub trait PropertyChecker {
    /// Check every property and return all results.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True if every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the violated properties.
    fn failures(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<PropertyResult>);

    impl PropertyChecker for Fixed {
        fn check_all(&self) -> Vec<PropertyResult> {
            self.0.clone()
        }
    }

    #[test]
    fn test_all_hold_and_failures() {
        let ok = Fixed(vec![PropertyResult::pass("A", "x", 1)]);
        assert!(ok.all_hold());
        assert!(ok.failures().is_empty());

        let bad = Fixed(vec![
            PropertyResult::pass("A", "x", 1),
            PropertyResult::fail("B", "x", 2, "broken".into(), None),
        ]);
        assert!(!bad.all_hold());
        assert_eq!(bad.failures().len(), 1);
        assert_eq!(bad.failures()[0].name, "B");
    }

    #[test]
    fn test_format() {
        let r = PropertyResult::fail("FifoOrder", "bounded_queue", 3, "out of order".into(), None);
        assert_eq!(r.format(), "[FAIL] FifoOrder (bounded_queue#3): out of order");
    }
}
