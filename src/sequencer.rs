//! Sequential async chain-runner.
//!
//! Folds a sequence of items into one chained asynchronous computation:
//! each item's resolution strictly precedes the next invocation, and the
//! first failure short-circuits the remainder. All three execution phases
//! run through this; the cleanup phase wraps its step so failures are
//! swallowed before the fold continues.

use std::future::Future;

use crate::errors::SpecError;

pub async fn sequential_execute<I, T, F, Fut>(items: I, mut step: F) -> Result<(), SpecError>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), SpecError>>,
{
    for item in items {
        step(item).await?;
    }
    Ok(())
}

#[cfg(test)]
mod sequencer_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::executor::block_on;

    use super::*;

    #[test]
    fn items_run_strictly_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let result = block_on(sequential_execute(1..=4, |n| {
            let seen = Rc::clone(&seen_in);
            async move {
                seen.borrow_mut().push(n);
                Ok(())
            }
        }));
        assert!(result.is_ok());
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn first_failure_short_circuits() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let result = block_on(sequential_execute(1..=4, |n| {
            let seen = Rc::clone(&seen_in);
            async move {
                if n == 3 {
                    return Err(SpecError::action("third step failed"));
                }
                seen.borrow_mut().push(n);
                Ok(())
            }
        }));
        assert!(result.is_err());
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }
}
