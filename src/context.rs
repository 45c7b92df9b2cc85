//! Per-test-execution binding scope.
//!
//! A [`Context`] is created fresh at the start of each compiled test body and
//! discarded at its end; it is never shared across test executions. All three
//! execution phases of one test see the same context, so side effects of
//! earlier steps are visible to later ones.
//!
//! Deferred steps (`given`/`let_`) install a [`LazyCell`] whose initializer
//! runs on the first read of the name. The outcome, success or failure, is
//! cached; an explicit `set` marks the cell evaluated without ever invoking
//! the initializer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::SpecError;
use crate::value::Value;

/// Initializer for a lazily evaluated context binding.
pub type InitFn = Rc<dyn Fn(&Context) -> Result<Value, SpecError>>;

/// Wraps a closure into an [`InitFn`], for use with the batch binding forms.
pub fn init<F>(f: F) -> InitFn
where
    F: Fn(&Context) -> Result<Value, SpecError> + 'static,
{
    Rc::new(f)
}

struct LazyCell {
    evaluated: bool,
    cached: Option<Result<Value, SpecError>>,
    init: InitFn,
}

enum Slot {
    Value(Value),
    Lazy(LazyCell),
}

/// The per-test value-binding scope shared by all phases of one compiled
/// test body. Cloning yields another handle to the same bindings.
#[derive(Clone, Default)]
pub struct Context {
    slots: Rc<RefCell<HashMap<String, Slot>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to an explicit value. On a lazy cell this marks the cell
    /// evaluated and stores the value; the initializer will never run.
    pub fn set(&self, name: &str, value: Value) {
        let mut slots = self.slots.borrow_mut();
        match slots.get_mut(name) {
            Some(Slot::Lazy(cell)) => {
                cell.evaluated = true;
                cell.cached = Some(Ok(value));
            }
            _ => {
                slots.insert(name.to_string(), Slot::Value(value));
            }
        }
    }

    /// Installs a lazy cell for `name`, replacing any previous binding.
    pub fn bind_lazy(&self, name: &str, init: InitFn) {
        self.slots.borrow_mut().insert(
            name.to_string(),
            Slot::Lazy(LazyCell {
                evaluated: false,
                cached: None,
                init,
            }),
        );
    }

    /// Reads a binding, forcing its lazy initializer on first access.
    ///
    /// The initializer runs at most once per context; its outcome (value or
    /// failure) is cached and replayed on later reads. Reading an unbound
    /// name is an error.
    pub fn get(&self, name: &str) -> Result<Value, SpecError> {
        let init = {
            let mut slots = self.slots.borrow_mut();
            match slots.get_mut(name) {
                None => {
                    return Err(SpecError::action(format!(
                        "no binding named '{}' in the test context",
                        name
                    )))
                }
                Some(Slot::Value(v)) => return Ok(v.clone()),
                Some(Slot::Lazy(cell)) => {
                    if let Some(cached) = &cell.cached {
                        return cached.clone();
                    }
                    if cell.evaluated {
                        // evaluated but not yet cached: the initializer is
                        // currently running further up the stack
                        return Err(SpecError::action(format!(
                            "lazy binding '{}' is self-referential",
                            name
                        )));
                    }
                    cell.evaluated = true;
                    Rc::clone(&cell.init)
                }
            }
        };

        // The borrow is released while the initializer runs so it may read
        // other bindings on the same context.
        let result = init(self);

        let mut slots = self.slots.borrow_mut();
        if let Some(Slot::Lazy(cell)) = slots.get_mut(name) {
            cell.cached = Some(result.clone());
        }
        result
    }

    /// Reads a binding, mapping any failure (including an unbound name) to
    /// `Value::Nil`. Intended for diagnostic sub-expression evaluators,
    /// which must not themselves fail.
    pub fn get_or_nil(&self, name: &str) -> Value {
        self.get(name).unwrap_or(Value::Nil)
    }

    /// Returns true if `name` is bound (lazily or otherwise).
    pub fn has(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }
}
