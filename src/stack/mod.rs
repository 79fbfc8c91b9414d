//! Stacks for coroutines.
//!
//! The runtime takes any object implementing [`Stack`] and assumes ownership
//! of it for the lifetime of the coroutine: the activation record holds the
//! stack by value and drops it when the coroutine terminates or is unwound,
//! so deallocation needs no external bookkeeping. The mmap-based
//! [`DefaultStack`] is appropriate for most uses; [`Preallocated`] carves a
//! caller-reserved area out of an existing stack. Growable (segmented) stacks
//! are not provided, but nothing in the runtime assumes a stack cannot be
//! backed by one: implement [`Stack`] for it and spawn with `callcc_on`.

use std::num::NonZeroUsize;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "default-stack", unix))] {
        mod unix;
        pub use self::unix::DefaultStack;
    }
}

/// Type to represent a stack address.
pub type StackPointer = NonZeroUsize;

/// Required stack alignment at function call boundaries.
pub const STACK_ALIGNMENT: usize = crate::arch::STACK_ALIGNMENT;

/// Minimum usable size of a stack, excluding guard pages. Below this there is
/// not enough room for the activation record and the entry machinery.
pub const MIN_STACK_SIZE: usize = 4096;

/// A region of memory used as a coroutine stack.
///
/// # Safety
///
/// The region between `limit` and `base` must stay valid and unmoved for the
/// lifetime of the object, contain at least [`MIN_STACK_SIZE`] writable bytes
/// below `base`, and either end in a guard page or be large enough that the
/// code run on it cannot overflow.
pub unsafe trait Stack {
    /// The high end of the stack, where execution starts. Stacks grow
    /// downwards on all supported targets.
    ///
    /// Must be aligned to [`STACK_ALIGNMENT`].
    fn base(&self) -> StackPointer;

    /// The low end of the stack, including any guard page.
    fn limit(&self) -> StackPointer;
}

// A mutable reference can stand in for the stack it borrows. Only useful for
// borrows that satisfy the 'static bound on spawning, e.g. leaked stacks.
unsafe impl<S: Stack> Stack for &'_ mut S {
    #[inline]
    fn base(&self) -> StackPointer {
        (**self).base()
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        (**self).limit()
    }
}

/// A stack with its top `reserve` bytes set aside for the caller.
///
/// The coroutine machinery only sees the remainder below the reserved area;
/// the reserved bytes are never read or written by the runtime. The wrapped
/// stack is still deallocated as one unit when the coroutine ends.
pub struct Preallocated<S: Stack> {
    base: StackPointer,
    stack: S,
}

impl<S: Stack> Preallocated<S> {
    /// Reserves the `reserve` bytes at the top of `stack` for the caller and
    /// uses the rest as the coroutine stack.
    ///
    /// # Panics
    ///
    /// Panics if the remainder would be smaller than [`MIN_STACK_SIZE`].
    pub fn new(reserve: usize, stack: S) -> Self {
        let base = stack
            .base()
            .get()
            .checked_sub(reserve)
            .map(|base| base & !(STACK_ALIGNMENT - 1))
            .expect("reservation exceeds the stack");
        assert!(
            base.checked_sub(MIN_STACK_SIZE).unwrap_or(0) >= stack.limit().get(),
            "reservation leaves too little stack"
        );
        Preallocated {
            base: StackPointer::new(base).unwrap(),
            stack,
        }
    }

    /// Lower bound of the reserved area. The caller's bytes live between
    /// here and the wrapped stack's base; the coroutine only ever touches
    /// memory below this address.
    pub fn reserved_limit(&self) -> StackPointer {
        self.base
    }
}

unsafe impl<S: Stack> Stack for Preallocated<S> {
    #[inline]
    fn base(&self) -> StackPointer {
        self.base
    }

    #[inline]
    fn limit(&self) -> StackPointer {
        self.stack.limit()
    }
}

#[cfg(all(test, feature = "default-stack", unix))]
mod tests {
    use super::{DefaultStack, Preallocated, Stack, MIN_STACK_SIZE};

    #[test]
    fn assert_send_sync() {
        fn send<T: Send>() {}
        fn sync<T: Sync>() {}
        send::<DefaultStack>();
        sync::<DefaultStack>();
    }

    #[test]
    fn preallocated_carves_from_the_top() {
        let stack = DefaultStack::new(64 * 1024).unwrap();
        let base = stack.base();
        let limit = stack.limit();
        let prealloc = Preallocated::new(24, stack);
        assert!(prealloc.base().get() <= base.get() - 24);
        assert_eq!(prealloc.limit(), limit);
    }

    #[test]
    #[should_panic(expected = "too little stack")]
    fn preallocated_rejects_oversized_reserve() {
        let stack = DefaultStack::new(MIN_STACK_SIZE).unwrap();
        let size = stack.base().get() - stack.limit().get();
        let _ = Preallocated::new(size, stack);
    }
}
