//! Matcher helpers for inspecting captured failures.
//!
//! Capture-mode immediate steps (`given_i_capture`, `let_i_capture`) store
//! a failed action's error in the context as [`Value::Failure`]; these
//! predicates let later steps assert on it.

use crate::value::Value;

/// Matches any captured failure value.
pub fn failure() -> impl Fn(&Value) -> bool {
    |value| value.is_failure()
}

/// Matches a captured failure whose rendered message contains `needle`.
pub fn failure_containing(needle: impl Into<String>) -> impl Fn(&Value) -> bool {
    let needle = needle.into();
    move |value| {
        value
            .as_failure()
            .is_some_and(|e| e.to_string().contains(&needle))
    }
}

#[cfg(test)]
mod matchers_tests {
    use std::rc::Rc;

    use super::*;
    use crate::errors::SpecError;

    #[test]
    fn failure_matches_only_failure_values() {
        let captured = Value::Failure(Rc::new(SpecError::action("connection refused")));
        assert!(failure()(&captured));
        assert!(!failure()(&Value::Bool(false)));
    }

    #[test]
    fn failure_containing_checks_the_message() {
        let captured = Value::Failure(Rc::new(SpecError::action("connection refused")));
        assert!(failure_containing("refused")(&captured));
        assert!(!failure_containing("timeout")(&captured));
    }
}
