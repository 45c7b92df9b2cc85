//! Suite-tree navigator: the declaration-time scope cursor.
//!
//! The navigator is an explicit object owned by the engine rather than a
//! module-level global; it is mutated solely during synchronous declaration,
//! before any test executes. Each open `describe` block is a [`Scope`] on a
//! stack; registrar calls append to the innermost scope, and composed reads
//! concatenate root-to-current so nested tests inherit ancestor steps in
//! declaration order.
//!
//! The `ands` and `cleanups` lists of a scope are held behind shared
//! handles: a [`Snapshot`] taken at then-declaration time references them
//! live, so `and`/`cleanup` declarations made after the then, but before
//! the scope closes, still take effect at run time.

use std::cell::RefCell;
use std::rc::Rc;

use crate::action::Action;
use crate::context::InitFn;

/// A shared, mutable action list owned by a scope and referenced (not
/// copied) by snapshots.
pub type ActionListHandle = Rc<RefCell<Vec<Action>>>;

/// One preparation step, tagged at registration time.
#[derive(Clone)]
pub enum PrepStep {
    /// Install a lazy context cell; the initializer runs on first read.
    Bind { name: String, init: InitFn },
    /// Run an action for its side effect; failure is reported.
    Run(Action),
    /// Run an action and assign its outcome to a context name. On failure,
    /// either abort preparation (`report_failure`) or store the failure as
    /// data under the name and continue.
    RunInto {
        name: String,
        action: Action,
        report_failure: bool,
    },
}

struct Scope<S> {
    suite: S,
    givens: Vec<PrepStep>,
    whens: Vec<PrepStep>,
    invariants: Vec<Action>,
    ands: ActionListHandle,
    cleanups: ActionListHandle,
    then_count: usize,
}

impl<S> Scope<S> {
    fn new(suite: S) -> Self {
        Self {
            suite,
            givens: Vec::new(),
            whens: Vec::new(),
            invariants: Vec::new(),
            ands: Rc::new(RefCell::new(Vec::new())),
            cleanups: Rc::new(RefCell::new(Vec::new())),
            then_count: 0,
        }
    }
}

/// Scope state captured at then-declaration time. Givens, whens and
/// invariants are copied by value; `ands` is the declaring scope's live
/// handle and `cleanups` the handles of every scope on the open path.
pub struct Snapshot {
    pub givens: Vec<PrepStep>,
    pub whens: Vec<PrepStep>,
    pub invariants: Vec<Action>,
    pub ands: ActionListHandle,
    pub cleanups: Vec<ActionListHandle>,
}

/// The suite-scope stack, generic over the host's suite handle type.
///
/// Invariant: the stack always holds at least the root scope entered at
/// construction; `exit` never pops it.
pub struct ScopeTree<S> {
    stack: Vec<Scope<S>>,
}

impl<S: Clone> ScopeTree<S> {
    pub fn new(root_suite: S) -> Self {
        Self {
            stack: vec![Scope::new(root_suite)],
        }
    }

    pub fn enter(&mut self, suite: S) {
        self.stack.push(Scope::new(suite));
    }

    pub fn exit(&mut self) {
        // the root scope stays open for the lifetime of the engine
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current_suite(&self) -> S {
        self.current().suite.clone()
    }

    fn current(&self) -> &Scope<S> {
        self.stack.last().expect("scope stack holds the root scope")
    }

    fn current_mut(&mut self) -> &mut Scope<S> {
        self.stack
            .last_mut()
            .expect("scope stack holds the root scope")
    }

    pub fn add_given(&mut self, step: PrepStep) {
        self.current_mut().givens.push(step);
    }

    pub fn add_when(&mut self, step: PrepStep) {
        self.current_mut().whens.push(step);
    }

    pub fn add_invariant(&mut self, action: Action) {
        self.current_mut().invariants.push(action);
    }

    pub fn add_and(&mut self, action: Action) {
        self.current().ands.borrow_mut().push(action);
    }

    pub fn add_cleanup(&mut self, action: Action) {
        self.current().cleanups.borrow_mut().push(action);
    }

    pub fn note_then(&mut self) {
        self.current_mut().then_count += 1;
    }

    /// True if any scope on the open chain has registered a then clause.
    pub fn has_any_then(&self) -> bool {
        self.stack.iter().any(|scope| scope.then_count > 0)
    }

    /// All given steps of the composed scope, root to current.
    pub fn all_givens(&self) -> Vec<PrepStep> {
        self.stack
            .iter()
            .flat_map(|scope| scope.givens.iter().cloned())
            .collect()
    }

    /// All when steps of the composed scope, root to current.
    pub fn all_whens(&self) -> Vec<PrepStep> {
        self.stack
            .iter()
            .flat_map(|scope| scope.whens.iter().cloned())
            .collect()
    }

    /// All invariants of the composed scope, root to current.
    pub fn all_invariants(&self) -> Vec<Action> {
        self.stack
            .iter()
            .flat_map(|scope| scope.invariants.iter().cloned())
            .collect()
    }

    /// The live and-list handle of the innermost scope.
    pub fn current_ands(&self) -> ActionListHandle {
        Rc::clone(&self.current().ands)
    }

    /// The cleanup-list handles of every scope on the open path.
    pub fn cleanup_handles(&self) -> Vec<ActionListHandle> {
        self.stack
            .iter()
            .map(|scope| Rc::clone(&scope.cleanups))
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            givens: self.all_givens(),
            whens: self.all_whens(),
            invariants: self.all_invariants(),
            ands: self.current_ands(),
            cleanups: self.cleanup_handles(),
        }
    }
}
