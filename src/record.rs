//! Per-coroutine activation records.
//!
//! The record is the only bookkeeping a coroutine has: the stack it runs on
//! (held by value, so teardown needs no external lookup) and the user
//! function. It lives on the coroutine's own stack, in an aligned region
//! carved off the top, and record and stack are destroyed in one step by
//! [`Record::exit`], which necessarily runs on some *other* execution's
//! stack, because a stack cannot free itself while in use.

use std::mem::{align_of, size_of, ManuallyDrop};
use std::ptr;

use crate::arch::{self, Transfer};
use crate::stack::{Stack, StackPointer};
use crate::unwind;

/// Alignment of the record placement at the top of the stack.
const RECORD_ALIGNMENT: usize = 64;

/// The two ways a user function is invoked, selected at spawn time by its
/// signature: with the incoming payload decoded into a typed argument, or
/// with the continuation alone. Implemented by the adapter types in the
/// continuation module.
pub trait Invoke: 'static {
    /// Consumes the bootstrap transfer, runs the user function once and
    /// returns the context to switch to when it is done.
    fn invoke(self, t: Transfer) -> StackPointer;
}

/// Stack-resident control block of one coroutine.
pub struct Record<S: Stack, I: Invoke> {
    stack: ManuallyDrop<S>,
    func: ManuallyDrop<I>,
}

impl<S: Stack + 'static, I: Invoke> Record<S, I> {
    /// Builds a coroutine around `func`: reserves the record region at the
    /// top of `stack`, initializes the machine context below it, writes the
    /// record and performs the bootstrap switch. The new execution
    /// immediately switches back from its entry point, so the returned
    /// context is parked there, waiting for the resume that carries the spawn
    /// payload.
    pub fn create(stack: S, func: I) -> StackPointer {
        let base = stack.base();
        let align = align_of::<Self>().max(RECORD_ALIGNMENT);
        let record = (base.get() - size_of::<Self>()) & !(align - 1);
        debug_assert!(
            record > stack.limit().get(),
            "stack too small for its activation record"
        );

        unsafe {
            let context = arch::init_context(StackPointer::new_unchecked(record), Self::entry);
            ptr::write(
                record as *mut Self,
                Record {
                    stack: ManuallyDrop::new(stack),
                    func: ManuallyDrop::new(func),
                },
            );
            let t = arch::jump_context(context, record);
            StackPointer::new_unchecked(t.context)
        }
    }

    unsafe extern "C-unwind" fn entry(t: Transfer) -> ! {
        let record = t.data as *mut Self;

        // Hand control straight back to the spawner; the resume that wakes us
        // up again carries the spawn payload.
        let t = arch::jump_context(StackPointer::new_unchecked(t.context), 0);

        let next = unwind::catch_forced_unwind(|| {
            let func = ManuallyDrop::take(&mut (*record).func);
            func.invoke(t)
        });

        // Tear down record and stack from the next execution.
        arch::ontop_context(next, record as usize, Self::exit);
        unreachable!("resumed a terminated continuation");
    }

    unsafe extern "C-unwind" fn exit(t: Transfer) -> Transfer {
        let record = t.data as *mut Self;
        // Move the stack handle out before destroying the record: the record
        // lives on the stack it is about to free.
        let stack = ManuallyDrop::take(&mut (*record).stack);
        ptr::drop_in_place(record);
        drop(stack);
        // The previous execution is gone: deliver a dead handle and no data.
        Transfer {
            context: 0,
            data: 0,
        }
    }
}
