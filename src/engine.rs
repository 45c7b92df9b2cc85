//! The specification engine and its declaration surface.
//!
//! [`SpecEngine`] is instantiated over a [`Host`] — the test runner the
//! engine plugs into. Declaration calls (`describe`, `given`, `when`,
//! `then`, …) mutate the engine's suite-tree navigator; at then-declaration
//! time the current scope state is snapshotted and a compiled test body is
//! handed to the host, which invokes it later.
//!
//! All declaration happens synchronously, before any test executes; the
//! navigator cursor is the engine's only shared mutable state.

use std::cell::RefCell;
use std::rc::Rc;

use crate::action::{Action, Keyword};
use crate::compile::{
    compile_plain, invert_expecting_assertion_failure, invert_expecting_error, CompiledTest,
    ThenClause,
};
use crate::context::{Context, InitFn};
use crate::errors::SpecError;
use crate::navigator::{PrepStep, ScopeTree};
use crate::render::docify;
use crate::value::Value;

/// The host test runner the engine registers suites and tests with.
pub trait Host {
    /// Handle to a registered suite; cloned freely during declaration.
    type Suite: Clone + 'static;

    fn root_suite(&self) -> Self::Suite;
    fn add_suite(&mut self, parent: &Self::Suite, title: &str) -> Self::Suite;
    fn add_skipped_suite(&mut self, parent: &Self::Suite, title: &str) -> Self::Suite;
    fn add_test(&mut self, suite: &Self::Suite, label: &str, test: CompiledTest);
}

/// Pops the scope on drop, so `describe` bodies that panic still leave the
/// navigator balanced.
struct ScopeGuard<S: Clone + 'static> {
    navigator: Rc<RefCell<ScopeTree<S>>>,
}

impl<S: Clone + 'static> ScopeGuard<S> {
    fn enter(navigator: Rc<RefCell<ScopeTree<S>>>, suite: S) -> Self {
        navigator.borrow_mut().enter(suite);
        Self { navigator }
    }
}

impl<S: Clone + 'static> Drop for ScopeGuard<S> {
    fn drop(&mut self) {
        self.navigator.borrow_mut().exit();
    }
}

/// The Given/When/Then specification engine.
pub struct SpecEngine<H: Host> {
    host: RefCell<H>,
    navigator: Rc<RefCell<ScopeTree<H::Suite>>>,
}

impl<H: Host> SpecEngine<H> {
    /// Creates an engine rooted at the host's root suite.
    pub fn new(host: H) -> Self {
        let root = host.root_suite();
        Self {
            host: RefCell::new(host),
            navigator: Rc::new(RefCell::new(ScopeTree::new(root))),
        }
    }

    /// Consumes the engine, returning the host with all registrations.
    pub fn into_host(self) -> H {
        self.host.into_inner()
    }

    // ------------------------------------------------------------------
    // Suites and plain tests
    // ------------------------------------------------------------------

    /// Opens a suite and runs the declaration body inside its scope.
    pub fn describe(&self, title: &str, body: impl FnOnce(&Self)) {
        let parent = self.navigator.borrow().current_suite();
        let suite = self.host.borrow_mut().add_suite(&parent, title);
        log::debug!("describe '{}'", title);
        let _guard = ScopeGuard::enter(Rc::clone(&self.navigator), suite);
        body(self);
    }

    /// Opens a skipped suite; declarations inside still register.
    pub fn xdescribe(&self, title: &str, body: impl FnOnce(&Self)) {
        let parent = self.navigator.borrow().current_suite();
        let suite = self.host.borrow_mut().add_skipped_suite(&parent, title);
        log::debug!("xdescribe '{}'", title);
        let _guard = ScopeGuard::enter(Rc::clone(&self.navigator), suite);
        body(self);
    }

    /// Registers a plain test that resolves the action once.
    pub fn it(&self, title: &str, action: Action) {
        let suite = self.navigator.borrow().current_suite();
        self.host
            .borrow_mut()
            .add_test(&suite, title, compile_plain(action));
    }

    // ------------------------------------------------------------------
    // Deferred preparation: Given / Let
    // ------------------------------------------------------------------

    /// Binds `name` to a lazily evaluated value: the initializer runs on
    /// the first read of `name` during execution, at most once per test.
    pub fn given<F>(&self, name: &str, init: F)
    where
        F: Fn(&Context) -> Result<Value, SpecError> + 'static,
    {
        self.register_bind(Keyword::Given, name, Rc::new(init));
    }

    /// `Let` alias of [`given`](Self::given).
    pub fn let_<F>(&self, name: &str, init: F)
    where
        F: Fn(&Context) -> Result<Value, SpecError> + 'static,
    {
        self.register_bind(Keyword::Let, name, Rc::new(init));
    }

    /// Anonymous given: the action runs for its side effect during
    /// preparation; a failure is reported as a preparation failure.
    pub fn given_step(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_given(PrepStep::Run(action.with_keyword(Keyword::Given)));
    }

    /// Anonymous let, same semantics as [`given_step`](Self::given_step).
    pub fn let_step(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_given(PrepStep::Run(action.with_keyword(Keyword::Let)));
    }

    /// Batch form: binds each `(name, initializer)` pair lazily.
    pub fn given_all(&self, bindings: Vec<(&str, InitFn)>) {
        for (name, init) in bindings {
            self.register_bind(Keyword::Given, name, init);
        }
    }

    /// Batch `Let` alias of [`given_all`](Self::given_all).
    pub fn let_all(&self, bindings: Vec<(&str, InitFn)>) {
        for (name, init) in bindings {
            self.register_bind(Keyword::Let, name, init);
        }
    }

    fn register_bind(&self, keyword: Keyword, name: &str, init: InitFn) {
        log::trace!("{}: binding '{}'", keyword, name);
        self.navigator.borrow_mut().add_given(PrepStep::Bind {
            name: name.to_string(),
            init,
        });
    }

    // ------------------------------------------------------------------
    // Immediate preparation: GivenI / LetI / When
    // ------------------------------------------------------------------

    /// Anonymous immediate given: runs during preparation for its side
    /// effect; a failure is reported as a preparation failure.
    pub fn given_i(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_given(PrepStep::Run(action.with_keyword(Keyword::GivenI)));
    }

    /// Anonymous immediate let.
    pub fn let_i(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_given(PrepStep::Run(action.with_keyword(Keyword::LetI)));
    }

    /// Named immediate given: the resolved outcome is assigned to
    /// `context[name]`; a failure aborts preparation and is reported.
    pub fn given_i_as(&self, name: &str, action: Action) {
        self.register_run_into(Keyword::GivenI, name, action, true, true);
    }

    /// Named immediate given, capture mode: a failure is stored in
    /// `context[name]` as data and execution continues.
    pub fn given_i_capture(&self, name: &str, action: Action) {
        self.register_run_into(Keyword::GivenI, name, action, false, true);
    }

    /// Named immediate let; failures abort and are reported.
    pub fn let_i_as(&self, name: &str, action: Action) {
        self.register_run_into(Keyword::LetI, name, action, true, true);
    }

    /// Named immediate let, capture mode.
    pub fn let_i_capture(&self, name: &str, action: Action) {
        self.register_run_into(Keyword::LetI, name, action, false, true);
    }

    /// Batch immediate form, report mode.
    pub fn given_i_all(&self, bindings: Vec<(&str, Action)>) {
        for (name, action) in bindings {
            self.given_i_as(name, action);
        }
    }

    /// Batch immediate `Let` alias.
    pub fn let_i_all(&self, bindings: Vec<(&str, Action)>) {
        for (name, action) in bindings {
            self.let_i_as(name, action);
        }
    }

    /// Anonymous when: runs after all givens; failures are reported.
    pub fn when(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_when(PrepStep::Run(action.with_keyword(Keyword::When)));
    }

    /// Named when: assigns the outcome to `context[name]`. Always reports
    /// failures; they are never swallowed into the assigned variable.
    pub fn when_as(&self, name: &str, action: Action) {
        self.register_run_into(Keyword::When, name, action, true, false);
    }

    /// Batch when form.
    pub fn when_all(&self, bindings: Vec<(&str, Action)>) {
        for (name, action) in bindings {
            self.when_as(name, action);
        }
    }

    fn register_run_into(
        &self,
        keyword: Keyword,
        name: &str,
        action: Action,
        report_failure: bool,
        is_given: bool,
    ) {
        log::trace!("{}: '{}'", keyword, name);
        let step = PrepStep::RunInto {
            name: name.to_string(),
            action: action.with_keyword(keyword),
            report_failure,
        };
        let mut navigator = self.navigator.borrow_mut();
        if is_given {
            navigator.add_given(step);
        } else {
            navigator.add_when(step);
        }
    }

    // ------------------------------------------------------------------
    // Expectations: Invariant / Then / And, and Cleanup
    // ------------------------------------------------------------------

    /// Registers an assertion applied before the then action of every
    /// then clause in scope.
    pub fn invariant(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_invariant(action.with_keyword(Keyword::Invariant));
    }

    /// Chains an additional assertion onto the nearest preceding then in
    /// the current scope. Declaration-time usage error when no then has
    /// been registered in the current or an ancestor scope.
    pub fn and(&self, action: Action) -> Result<(), SpecError> {
        let mut navigator = self.navigator.borrow_mut();
        if !navigator.has_any_then() {
            return Err(SpecError::usage("And", "cannot use And without Then"));
        }
        navigator.add_and(action.with_keyword(Keyword::And));
        Ok(())
    }

    /// Registers a best-effort teardown action: always runs, failures are
    /// swallowed.
    pub fn cleanup(&self, action: Action) {
        self.navigator
            .borrow_mut()
            .add_cleanup(action.with_keyword(Keyword::Cleanup));
    }

    /// Declares the primary assertion and registers the compiled test.
    pub fn then(&self, action: Action) {
        self.register_then(Keyword::Then, None, action);
    }

    /// [`then`](Self::then) with an explicit label.
    pub fn then_labeled(&self, label: &str, action: Action) {
        self.register_then(Keyword::Then, Some(label), action);
    }

    /// Inverted assertion: the test passes only if the body fails.
    pub fn then_error(&self, action: Action) {
        self.register_then(Keyword::ThenError, None, action);
    }

    pub fn then_error_labeled(&self, label: &str, action: Action) {
        self.register_then(Keyword::ThenError, Some(label), action);
    }

    /// Inverted assertion: the test passes only if the body fails with a
    /// natural-assertion failure specifically.
    pub fn then_fail(&self, action: Action) {
        self.register_then(Keyword::ThenFail, None, action);
    }

    pub fn then_fail_labeled(&self, label: &str, action: Action) {
        self.register_then(Keyword::ThenFail, Some(label), action);
    }

    fn register_then(&self, keyword: Keyword, label: Option<&str>, action: Action) {
        let action = action.with_keyword(keyword);
        let label = label
            .map(str::to_string)
            .unwrap_or_else(|| docify(&action));

        let (snapshot, suite) = {
            let mut navigator = self.navigator.borrow_mut();
            let snapshot = navigator.snapshot();
            navigator.note_then();
            (snapshot, navigator.current_suite())
        };

        let compiled = ThenClause::new(label.clone(), action, snapshot).compile();
        let compiled = match keyword {
            Keyword::ThenError => invert_expecting_error(compiled),
            Keyword::ThenFail => invert_expecting_assertion_failure(compiled),
            _ => compiled,
        };

        log::debug!("{}: registering '{}'", keyword, label);
        self.host.borrow_mut().add_test(&suite, &label, compiled);
    }
}
