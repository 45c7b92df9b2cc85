//! Action model and the resolver that normalizes every action style into
//! one asynchronous contract.
//!
//! An [`Action`] is a unit of executable behavior tagged with the DSL
//! keyword it was declared under. Its body is chosen once at construction:
//! *direct* bodies are invoked with the context and hand back an
//! [`ActionReturn`] capability; *callback* bodies receive a continuation
//! and complete by invoking it. [`resolve`] probes the capability and
//! drives it to a single `Result<Value, SpecError>` outcome — the rest of
//! the engine never sees the source style.

use std::fmt;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;
use futures::StreamExt;

use crate::context::Context;
use crate::errors::SpecError;
use crate::value::Value;

/// The single-resolution future every action style collapses into.
pub type ActionFuture = LocalBoxFuture<'static, Result<Value, SpecError>>;

/// An event stream; resolved by collecting every item into a `Value::List`.
pub type ActionStream = LocalBoxStream<'static, Result<Value, SpecError>>;

/// Continuation handed to callback-style actions. Invoke with the outcome.
pub type Done = Box<dyn FnOnce(Result<Value, SpecError>)>;

/// Driver for a cooperative multi-step sequence. Each call receives the
/// previous step's resolved value and yields the next awaitable, or `None`
/// once the sequence has completed; the last resolved value is the outcome.
pub type SequenceDriver = Box<dyn FnMut(Value) -> Result<Option<ActionFuture>, SpecError>>;

/// Re-evaluates a sub-expression against the failing context; used by the
/// failure diagnostics renderer.
pub type Evaluator = Rc<dyn Fn(&Context) -> Value>;

/// The DSL keyword an action was declared under, carried for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Given,
    Let,
    GivenI,
    LetI,
    When,
    Then,
    Invariant,
    And,
    Cleanup,
    ThenError,
    ThenFail,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Given => "Given",
            Keyword::Let => "Let",
            Keyword::GivenI => "GivenI",
            Keyword::LetI => "LetI",
            Keyword::When => "When",
            Keyword::Then => "Then",
            Keyword::Invariant => "Invariant",
            Keyword::And => "And",
            Keyword::Cleanup => "Cleanup",
            Keyword::ThenError => "ThenError",
            Keyword::ThenFail => "ThenFail",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability union returned by direct-style action bodies, probed once at
/// the resolver boundary.
pub enum ActionReturn {
    /// An immediate value.
    Value(Value),
    /// A single-resolution future; awaited to settlement.
    Future(ActionFuture),
    /// An event stream; every item is collected into a `Value::List`.
    Stream(ActionStream),
    /// A cooperative multi-step sequence, driven step by step.
    Sequence(SequenceDriver),
}

enum ActionBody {
    Direct(Box<dyn Fn(&Context) -> Result<ActionReturn, SpecError>>),
    Callback(Box<dyn Fn(&Context, Done)>),
}

/// Recognized binary comparison operators for the diagnostic footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Greater,
    GreaterEq,
    Less,
    LessEq,
}

impl CompareOp {
    /// The English relation phrase shown next to the right-hand operand.
    pub fn relation(&self) -> &'static str {
        match self {
            CompareOp::Eq => "to equal",
            CompareOp::StrictEq => "to strictly equal",
            CompareOp::NotEq => "to not equal",
            CompareOp::StrictNotEq => "to strictly not equal",
            CompareOp::Greater => "to be greater than",
            CompareOp::GreaterEq => "to be greater or equal to",
            CompareOp::Less => "to be less than",
            CompareOp::LessEq => "to be less than or equal to",
        }
    }
}

/// A sub-expression evaluator paired with its absolute source column.
pub struct SubExpression {
    pub column: usize,
    pub evaluator: Evaluator,
}

/// Left/right operand evaluators of a binary comparison expression.
pub struct BinaryComparison {
    pub op: CompareOp,
    pub left: Evaluator,
    pub right: Evaluator,
}

/// Pre-computed source metadata for one compiled assertion, supplied
/// externally. Drives the comprehensive diagnostic form.
pub struct DiagnosticMeta {
    pub file_path: String,
    pub line: usize,
    /// Start column of the whole expression; sub-expression offsets are
    /// computed relative to it.
    pub column: usize,
    pub evaluators: Vec<SubExpression>,
    pub binary: Option<BinaryComparison>,
}

impl DiagnosticMeta {
    pub fn new(file_path: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
            evaluators: Vec::new(),
            binary: None,
        }
    }

    /// Adds a sub-expression evaluator at an absolute source column.
    pub fn with_sub<F>(mut self, column: usize, evaluator: F) -> Self
    where
        F: Fn(&Context) -> Value + 'static,
    {
        self.evaluators.push(SubExpression {
            column,
            evaluator: Rc::new(evaluator),
        });
        self
    }

    /// Marks the expression as a binary comparison with operand evaluators.
    pub fn with_comparison<L, R>(mut self, op: CompareOp, left: L, right: R) -> Self
    where
        L: Fn(&Context) -> Value + 'static,
        R: Fn(&Context) -> Value + 'static,
    {
        self.binary = Some(BinaryComparison {
            op,
            left: Rc::new(left),
            right: Rc::new(right),
        });
        self
    }
}

/// A unit of executable behavior with a declared body style, a keyword tag,
/// optional expression text, and optional diagnostic metadata.
///
/// Cloning an action is cheap; the body is shared.
#[derive(Clone)]
pub struct Action {
    body: Rc<ActionBody>,
    keyword: Keyword,
    expression: Option<Rc<str>>,
    meta: Option<Rc<DiagnosticMeta>>,
}

impl Action {
    fn from_body(body: ActionBody) -> Self {
        Self {
            body: Rc::new(body),
            keyword: Keyword::Then,
            expression: None,
            meta: None,
        }
    }

    /// A direct-style action returning any [`ActionReturn`] capability.
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<ActionReturn, SpecError> + 'static,
    {
        Self::from_body(ActionBody::Direct(Box::new(f)))
    }

    /// A direct-style action producing an immediate value.
    pub fn value<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<Value, SpecError> + 'static,
    {
        Self::direct(move |ctx| f(ctx).map(ActionReturn::Value))
    }

    /// A direct-style boolean assertion. Resolving to exactly `false` is
    /// what the expectation phase converts into a natural-assertion failure.
    pub fn assert<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<bool, SpecError> + 'static,
    {
        Self::direct(move |ctx| f(ctx).map(|b| ActionReturn::Value(Value::Bool(b))))
    }

    /// A direct-style action producing a future. The closure receives an
    /// owned context handle so the future can be `'static`.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + 'static,
        Fut: std::future::Future<Output = Result<Value, SpecError>> + 'static,
    {
        Self::direct(move |ctx| {
            Ok(ActionReturn::Future(Box::pin(f(ctx.clone()))))
        })
    }

    /// A direct-style action producing an event stream.
    pub fn stream<F>(f: F) -> Self
    where
        F: Fn(&Context) -> ActionStream + 'static,
    {
        Self::direct(move |ctx| Ok(ActionReturn::Stream(f(ctx))))
    }

    /// A direct-style action producing a cooperative multi-step sequence.
    pub fn sequence<F>(f: F) -> Self
    where
        F: Fn(&Context) -> SequenceDriver + 'static,
    {
        Self::direct(move |ctx| Ok(ActionReturn::Sequence(f(ctx))))
    }

    /// A callback-style action completing through its continuation.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Context, Done) + 'static,
    {
        Self::from_body(ActionBody::Callback(Box::new(f)))
    }

    /// Attaches the formatted source text of the expression, used for
    /// auto-generated labels and `Failing expression:` lines.
    pub fn with_expression(mut self, expression: &str) -> Self {
        self.expression = Some(Rc::from(expression));
        self
    }

    /// Attaches pre-computed diagnostic metadata.
    pub fn with_meta(mut self, meta: DiagnosticMeta) -> Self {
        self.meta = Some(Rc::new(meta));
        self
    }

    /// Re-tags the action with the keyword it is registered under.
    pub fn with_keyword(mut self, keyword: Keyword) -> Self {
        self.keyword = keyword;
        self
    }

    pub fn keyword(&self) -> Keyword {
        self.keyword
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn meta(&self) -> Option<&DiagnosticMeta> {
        self.meta.as_deref()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("keyword", &self.keyword)
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

/// Resolves an action against a context into one eventual outcome.
///
/// Dispatches on the body style chosen at construction, then probes the
/// returned capability: immediate values pass through, futures are awaited,
/// streams are collected into a `Value::List`, and sequences are driven
/// step by step with each resolved value fed back into the driver. The
/// resolver reports failures through the returned `Result`; it never
/// panics on action misbehavior.
pub async fn resolve(action: &Action, ctx: &Context) -> Result<Value, SpecError> {
    match &*action.body {
        ActionBody::Direct(f) => match f(ctx)? {
            ActionReturn::Value(v) => Ok(v),
            ActionReturn::Future(fut) => fut.await,
            ActionReturn::Stream(stream) => collect_stream(stream).await,
            ActionReturn::Sequence(driver) => drive_sequence(driver).await,
        },
        ActionBody::Callback(f) => {
            let (tx, rx) = oneshot::channel();
            let done: Done = Box::new(move |outcome| {
                let _ = tx.send(outcome);
            });
            f(ctx, done);
            match rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Err(SpecError::action(format!(
                    "{}: continuation dropped without being invoked",
                    action.keyword
                ))),
            }
        }
    }
}

async fn collect_stream(mut stream: ActionStream) -> Result<Value, SpecError> {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item?);
    }
    Ok(Value::List(items))
}

async fn drive_sequence(mut driver: SequenceDriver) -> Result<Value, SpecError> {
    let mut last = Value::Nil;
    while let Some(step) = driver(last.clone())? {
        last = step.await?;
    }
    Ok(last)
}

/// Builds a boolean assertion action and captures its source text for
/// diagnostics, standing in for source-position tooling:
///
/// ```rust
/// use natspec::expect;
/// use natspec::value::Value;
/// let action = expect!(|ctx| ctx.get("count")? == Value::from(3));
/// assert_eq!(action.expression(), Some("ctx.get(\"count\")? == Value::from(3)"));
/// ```
#[macro_export]
macro_rules! expect {
    (|$ctx:ident| $body:expr) => {
        $crate::action::Action::assert(move |$ctx: &$crate::context::Context| {
            let _ = &$ctx;
            Ok($body)
        })
        .with_expression(stringify!($body))
    };
}

#[cfg(test)]
mod action_tests {
    use std::cell::Cell;

    use futures::executor::block_on;
    use futures::stream;

    use super::*;

    #[test]
    fn direct_value_resolves_immediately() {
        let ctx = Context::new();
        let action = Action::value(|_| Ok(Value::from(5)));
        assert_eq!(block_on(resolve(&action, &ctx)).unwrap(), Value::from(5));
    }

    #[test]
    fn direct_failure_is_the_outcome() {
        let ctx = Context::new();
        let action = Action::value(|_| Err(SpecError::action("nope")));
        let err = block_on(resolve(&action, &ctx)).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn future_is_awaited_to_settlement() {
        let ctx = Context::new();
        let action = Action::future(|_ctx| async { Ok(Value::from("done")) });
        assert_eq!(
            block_on(resolve(&action, &ctx)).unwrap(),
            Value::from("done")
        );
    }

    #[test]
    fn stream_collects_every_item_into_a_list() {
        let ctx = Context::new();
        let action = Action::stream(|_| {
            Box::pin(stream::iter(vec![
                Ok(Value::from(1)),
                Ok(Value::from(2)),
                Ok(Value::from(3)),
            ]))
        });
        assert_eq!(
            block_on(resolve(&action, &ctx)).unwrap(),
            Value::List(vec![Value::from(1), Value::from(2), Value::from(3)])
        );
    }

    #[test]
    fn stream_error_fails_the_action() {
        let ctx = Context::new();
        let action = Action::stream(|_| {
            Box::pin(stream::iter(vec![
                Ok(Value::from(1)),
                Err(SpecError::action("stream broke")),
            ]))
        });
        let err = block_on(resolve(&action, &ctx)).unwrap_err();
        assert!(err.to_string().contains("stream broke"));
    }

    #[test]
    fn sequence_feeds_each_resolved_value_forward() {
        let ctx = Context::new();
        let action = Action::sequence(|_| {
            let step = Cell::new(0);
            Box::new(move |previous: Value| {
                step.set(step.get() + 1);
                match step.get() {
                    1 => {
                        assert_eq!(previous, Value::Nil);
                        Ok(Some(Box::pin(async { Ok(Value::from(10)) }) as ActionFuture))
                    }
                    2 => {
                        assert_eq!(previous, Value::from(10));
                        Ok(Some(Box::pin(async { Ok(Value::from(20)) }) as ActionFuture))
                    }
                    _ => Ok(None),
                }
            })
        });
        assert_eq!(block_on(resolve(&action, &ctx)).unwrap(), Value::from(20));
    }

    #[test]
    fn sequence_failure_short_circuits() {
        let ctx = Context::new();
        let action = Action::sequence(|_| {
            let step = Cell::new(0);
            Box::new(move |_| {
                step.set(step.get() + 1);
                match step.get() {
                    1 => Ok(Some(
                        Box::pin(async { Err(SpecError::action("mid-sequence")) }) as ActionFuture,
                    )),
                    _ => panic!("driver must not be resumed after a failed step"),
                }
            })
        });
        let err = block_on(resolve(&action, &ctx)).unwrap_err();
        assert!(err.to_string().contains("mid-sequence"));
    }

    #[test]
    fn callback_outcome_comes_from_the_continuation() {
        let ctx = Context::new();
        let ok = Action::callback(|_, done| done(Ok(Value::from(9))));
        assert_eq!(block_on(resolve(&ok, &ctx)).unwrap(), Value::from(9));

        let failing = Action::callback(|_, done| done(Err(SpecError::action("cb failed"))));
        let err = block_on(resolve(&failing, &ctx)).unwrap_err();
        assert!(err.to_string().contains("cb failed"));
    }

    #[test]
    fn dropped_continuation_is_reported() {
        let ctx = Context::new();
        let action = Action::callback(|_, done| drop(done)).with_keyword(Keyword::When);
        let err = block_on(resolve(&action, &ctx)).unwrap_err();
        assert!(err.to_string().contains("continuation dropped"));
        assert!(err.to_string().contains("When"));
    }

    #[test]
    fn expect_macro_captures_expression_text() {
        let ctx = Context::new();
        ctx.set("count", Value::from(3));
        let action = expect!(|ctx| ctx.get("count")? == Value::from(3));
        assert_eq!(block_on(resolve(&action, &ctx)).unwrap(), Value::Bool(true));
        assert!(action.expression().unwrap().contains("count"));
    }
}
