//! Drop guards.

/// Drop guard returned by [`defer`].
#[must_use = "`Defer` should be assigned to a variable, or it will be dropped immediately"]
pub struct Defer<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}

/// Returns a value that runs `cb` when dropped, including during unwinding.
pub fn defer<F: FnOnce()>(cb: F) -> Defer<F> {
    Defer(Some(cb))
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    };

    use super::*;

    #[test]
    fn runs_on_unwind() {
        let ran = Cell::new(false);
        catch_unwind(AssertUnwindSafe(|| {
            let _guard = defer(|| ran.set(true));
            resume_unwind(Box::new("boom"));
        }))
        .unwrap_err();
        assert!(ran.get());
    }
}
