//! Forced unwinding of suspended contexts.
//!
//! Dropping a live continuation must run the destructors of everything on the
//! target stack before the stack itself can be freed. This is done by
//! switching to the target with a hook that raises a panic whose payload is a
//! crate-private type: the panic unwinds the target's frames like any other,
//! and the context entry point catches exactly that payload and proceeds to
//! tear the context down. User code cannot name the type, so an ordinary
//! `catch_unwind` in a coroutine should rethrow anything it does not
//! recognize or the teardown protocol breaks.
//!
//! The panic is raised with `resume_unwind` so the panic hook does not run.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::arch::Transfer;
use crate::stack::StackPointer;

/// Panic payload used to unwind a context. Carries the context pointer of the
/// execution that initiated the unwind, which becomes the exit destination.
pub struct ForcedUnwind(pub StackPointer);

/// Hook passed to `ontop_context` when a live continuation is dropped. Runs
/// on the target stack; the transfer's context field identifies the dropping
/// execution.
pub unsafe extern "C-unwind" fn forced_unwind_hook(t: Transfer) -> Transfer {
    panic::resume_unwind(Box::new(ForcedUnwind(StackPointer::new_unchecked(
        t.context,
    ))))
}

/// Runs a coroutine body, converting a forced unwind into the context to exit
/// to. Any other panic aborts the process: in a symmetric runtime there is no
/// implicit parent to propagate it to.
pub fn catch_forced_unwind(f: impl FnOnce() -> StackPointer) -> StackPointer {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(next) => next,
        Err(payload) => forced_unwind_target(payload),
    }
}

fn forced_unwind_target(payload: Box<dyn Any + Send>) -> StackPointer {
    match payload.downcast::<ForcedUnwind>() {
        Ok(unwind) => unwind.0,
        Err(_) => {
            // Force an abort with a double panic; unwinding further would
            // run off the fabricated frame at the root of the stack.
            let _guard = scopeguard::guard((), |()| {
                panic!("cannot propagate a panic out of a continuation");
            });
            panic!("panic reached the root of a continuation");
        }
    }
}
