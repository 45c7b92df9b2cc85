//! Then-clause compiler: turns a declared assertion plus the ambient scope
//! state into a runnable three-phase test body.
//!
//! The compiled body owns a [`Snapshot`] captured at declaration time and
//! executes Preparation → Expectation → Cleanup against one fresh
//! [`Context`]. Preparation failures abort the rest of preparation and skip
//! expectation; cleanup runs unconditionally and its own failures are
//! swallowed; the originally captured failure is what gets reported.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::action::{resolve, Action};
use crate::context::Context;
use crate::errors::{ErrorKind, SpecError};
use crate::navigator::{PrepStep, Snapshot};
use crate::render::{docify, natural_failure};
use crate::sequencer::sequential_execute;
use crate::value::Value;

/// Completion callback in the host contract: invoked with `None` on
/// success or `Some(error)` on failure.
pub type DoneCallback = Box<dyn FnOnce(Option<SpecError>)>;

/// A compiled test body, handed to the host at declaration time and
/// invoked by the host runner later.
///
/// The body future is `!Send`; the host drives it on a local executor.
pub struct CompiledTest {
    body: Box<dyn FnOnce() -> LocalBoxFuture<'static, Result<(), SpecError>>>,
}

impl CompiledTest {
    pub(crate) fn new<F>(body: F) -> Self
    where
        F: FnOnce() -> LocalBoxFuture<'static, Result<(), SpecError>> + 'static,
    {
        Self {
            body: Box::new(body),
        }
    }

    /// Runs the body, yielding the test outcome.
    pub fn run(self) -> LocalBoxFuture<'static, Result<(), SpecError>> {
        (self.body)()
    }

    /// Runs the body through the callback-style host contract.
    pub fn run_with(self, done: DoneCallback) -> LocalBoxFuture<'static, ()> {
        let fut = self.run();
        async move {
            done(fut.await.err());
        }
        .boxed_local()
    }
}

/// A then declaration: label, assertion action, and the scope snapshot
/// captured when it was declared. Immutable once execution starts; the
/// snapshot's and-list is a live handle, so `and` declarations made before
/// the enclosing scope closes still join the expectation phase.
pub struct ThenClause {
    label: String,
    action: Action,
    snapshot: Snapshot,
}

impl ThenClause {
    pub fn new(label: String, action: Action, snapshot: Snapshot) -> Self {
        Self {
            label,
            action,
            snapshot,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Compiles the three-phase test body.
    pub fn compile(self) -> CompiledTest {
        let ThenClause {
            label,
            action,
            snapshot,
        } = self;
        CompiledTest::new(move || execute(label, action, snapshot).boxed_local())
    }
}

/// Compiles a bare `it` action: resolved once against a fresh context,
/// with no phase structure and no falsy-to-failure conversion.
pub(crate) fn compile_plain(action: Action) -> CompiledTest {
    CompiledTest::new(move || {
        async move {
            let ctx = Context::new();
            sequential_execute([action], |action| {
                let ctx = ctx.clone();
                async move { resolve(&action, &ctx).await.map(|_| ()) }
            })
            .await
        }
        .boxed_local()
    })
}

/// Inverts a compiled body for `then_error`: any failure is success, and
/// success is reported as a failure.
pub(crate) fn invert_expecting_error(test: CompiledTest) -> CompiledTest {
    CompiledTest::new(move || {
        async move {
            match test.run().await {
                Err(_) => Ok(()),
                Ok(()) => Err(SpecError::action("expect an error but not")),
            }
        }
        .boxed_local()
    })
}

/// Inverts a compiled body for `then_fail`: success requires a failure of
/// the natural-assertion kind specifically.
pub(crate) fn invert_expecting_assertion_failure(test: CompiledTest) -> CompiledTest {
    CompiledTest::new(move || {
        async move {
            match test.run().await {
                Err(e) if e.kind() == ErrorKind::ExpectationNotMet => Ok(()),
                Err(e) => Err(SpecError::action(format!(
                    "expect an ExpectationNotMet error but got {}",
                    e.kind()
                ))),
                Ok(()) => Err(SpecError::action(
                    "expect an ExpectationNotMet error but not succeed",
                )),
            }
        }
        .boxed_local()
    })
}

async fn execute(label: String, action: Action, snapshot: Snapshot) -> Result<(), SpecError> {
    let ctx = Context::new();
    log::trace!("running '{}'", label);

    let outcome = match run_preparations(&snapshot, &ctx).await {
        Ok(()) => run_expectations(&label, &action, &snapshot, &ctx).await,
        Err(e) => Err(e),
    };

    // cleanup runs regardless of the phase-1/2 outcome
    run_cleanups(&snapshot, &ctx).await;
    outcome
}

async fn run_preparations(snapshot: &Snapshot, ctx: &Context) -> Result<(), SpecError> {
    let steps: Vec<PrepStep> = snapshot
        .givens
        .iter()
        .cloned()
        .chain(snapshot.whens.iter().cloned())
        .collect();
    sequential_execute(steps, |step| run_prep_step(step, ctx)).await
}

async fn run_prep_step(step: PrepStep, ctx: &Context) -> Result<(), SpecError> {
    match step {
        PrepStep::Bind { name, init } => {
            ctx.bind_lazy(&name, init);
            Ok(())
        }
        PrepStep::Run(action) => match resolve(&action, ctx).await {
            Ok(_) => Ok(()),
            Err(e) => Err(preparation_failure(&action, e)),
        },
        PrepStep::RunInto {
            name,
            action,
            report_failure,
        } => match resolve(&action, ctx).await {
            Ok(value) => {
                ctx.set(&name, value);
                Ok(())
            }
            Err(e) if report_failure => Err(preparation_failure(&action, e)),
            Err(e) => {
                // the failure itself becomes the assigned value, so later
                // steps can inspect it as data
                ctx.set(&name, Value::Failure(Rc::new(e)));
                Ok(())
            }
        },
    }
}

fn preparation_failure(action: &Action, reason: SpecError) -> SpecError {
    let message = format!(
        "Failing expression: {}\n\n       Reason: {}\n",
        docify(action),
        reason
    );
    SpecError::preparation(message, reason)
}

async fn run_expectations(
    label: &str,
    action: &Action,
    snapshot: &Snapshot,
    ctx: &Context,
) -> Result<(), SpecError> {
    let mut checks: Vec<Action> = snapshot.invariants.clone();
    checks.push(action.clone());
    // the and-list is read through the live handle at this moment
    checks.extend(snapshot.ands.borrow().iter().cloned());

    sequential_execute(checks, |check| run_check(check, label, ctx)).await
}

async fn run_check(check: Action, label: &str, ctx: &Context) -> Result<(), SpecError> {
    // non-falsy failures propagate unchanged; only an outcome of exactly
    // `false` becomes a natural-assertion failure
    let value = resolve(&check, ctx).await?;
    if value == Value::Bool(false) {
        return Err(natural_failure(&check, label, ctx));
    }
    Ok(())
}

async fn run_cleanups(snapshot: &Snapshot, ctx: &Context) {
    let actions: Vec<Action> = snapshot
        .cleanups
        .iter()
        .flat_map(|handle| handle.borrow().iter().cloned().collect::<Vec<_>>())
        .collect();

    let _ = sequential_execute(actions, |action| async move {
        if let Err(e) = resolve(&action, ctx).await {
            log::debug!("cleanup failure ignored: {}", e);
        }
        Ok(())
    })
    .await;
}
