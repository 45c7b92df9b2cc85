//! Shared test host: records every suite and test the engine registers and
//! lets tests pull compiled bodies back out to run them.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use natspec::compile::CompiledTest;
use natspec::engine::Host;
use natspec::errors::SpecError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuiteId(pub usize);

pub struct SuiteRecord {
    pub title: String,
    pub parent: Option<usize>,
    pub skipped: bool,
}

pub struct TestRecord {
    pub suite: SuiteId,
    pub label: String,
    pub test: Option<CompiledTest>,
}

#[derive(Default)]
pub struct HostState {
    pub suites: Vec<SuiteRecord>,
    pub tests: Vec<TestRecord>,
}

/// A [`Host`] that records registrations into shared state, so the test
/// keeps a handle after handing a clone to the engine.
#[derive(Clone, Default)]
pub struct RecordingHost {
    pub state: Rc<RefCell<HostState>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        let host = Self::default();
        host.state.borrow_mut().suites.push(SuiteRecord {
            title: "root".to_string(),
            parent: None,
            skipped: false,
        });
        host
    }

    pub fn labels(&self) -> Vec<String> {
        self.state
            .borrow()
            .tests
            .iter()
            .map(|t| t.label.clone())
            .collect()
    }

    pub fn suite_titles(&self) -> Vec<String> {
        self.state
            .borrow()
            .suites
            .iter()
            .map(|s| s.title.clone())
            .collect()
    }

    pub fn suite_parent(&self, title: &str) -> Option<usize> {
        self.state
            .borrow()
            .suites
            .iter()
            .find(|s| s.title == title)
            .and_then(|s| s.parent)
    }

    pub fn is_skipped(&self, title: &str) -> bool {
        self.state
            .borrow()
            .suites
            .iter()
            .any(|s| s.title == title && s.skipped)
    }

    pub fn test_count(&self) -> usize {
        self.state.borrow().tests.len()
    }

    /// Takes the compiled body registered under `label`.
    pub fn take_test(&self, label: &str) -> CompiledTest {
        self.state
            .borrow_mut()
            .tests
            .iter_mut()
            .find(|t| t.label == label)
            .unwrap_or_else(|| panic!("no test registered with label '{label}'"))
            .test
            .take()
            .expect("test was already taken")
    }

    /// Takes the single registered compiled body.
    pub fn take_only_test(&self) -> CompiledTest {
        let mut state = self.state.borrow_mut();
        assert_eq!(state.tests.len(), 1, "expected exactly one registered test");
        state.tests[0].test.take().expect("test was already taken")
    }
}

impl Host for RecordingHost {
    type Suite = SuiteId;

    fn root_suite(&self) -> SuiteId {
        SuiteId(0)
    }

    fn add_suite(&mut self, parent: &SuiteId, title: &str) -> SuiteId {
        let mut state = self.state.borrow_mut();
        state.suites.push(SuiteRecord {
            title: title.to_string(),
            parent: Some(parent.0),
            skipped: false,
        });
        SuiteId(state.suites.len() - 1)
    }

    fn add_skipped_suite(&mut self, parent: &SuiteId, title: &str) -> SuiteId {
        let mut state = self.state.borrow_mut();
        state.suites.push(SuiteRecord {
            title: title.to_string(),
            parent: Some(parent.0),
            skipped: true,
        });
        SuiteId(state.suites.len() - 1)
    }

    fn add_test(&mut self, suite: &SuiteId, label: &str, test: CompiledTest) {
        self.state.borrow_mut().tests.push(TestRecord {
            suite: *suite,
            label: label.to_string(),
            test: Some(test),
        });
    }
}

/// Drives a compiled body to completion on the current thread.
pub fn run(test: CompiledTest) -> Result<(), SpecError> {
    futures::executor::block_on(test.run())
}
