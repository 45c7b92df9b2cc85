pub use crate::action::{resolve, Action, ActionReturn, CompareOp, DiagnosticMeta, Keyword};
pub use crate::compile::{CompiledTest, DoneCallback, ThenClause};
pub use crate::context::{init, Context, InitFn};
pub use crate::engine::{Host, SpecEngine};
pub use crate::errors::{ErrorKind, SpecError};
pub use crate::matchers::{failure, failure_containing};
pub use crate::value::Value;

pub mod action;
pub mod compile;
pub mod context;
pub mod engine;
pub mod errors;
pub mod matchers;
pub mod navigator;
pub mod render;
pub mod sequencer;
pub mod value;
