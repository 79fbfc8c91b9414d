//! Architecture-specific context switching.
//!
//! Each backend implements the same three primitives on top of a saved-frame
//! layout of its own choosing:
//!
//! - `init_context` fabricates a frame at the top of a fresh stack so that the
//!   first switch into it enters the given entry function.
//! - `jump_context` suspends the current execution, resumes the target and
//!   delivers one machine word. It returns when some other execution switches
//!   back, yielding that execution's context pointer and its word.
//! - `ontop_context` is `jump_context` except that the given hook function is
//!   called on the target stack, at the target's suspension point, before the
//!   target's own code continues. Whatever the hook returns is what the
//!   target observes as the incoming transfer.
//!
//! The switch routines are defined with `global_asm!` and entered through a
//! regular call instruction. This matters for unwinding: when a context is
//! suspended, the return address of its `callcc_jump_context` call sits
//! directly below the saved frame, so a hook invoked by `ontop_context` runs
//! as if it had been called from the suspension point itself. A panicking
//! hook therefore unwinds straight into the target's frames without the
//! unwinder ever having to interpret the assembly code, which is why the
//! primitives are declared with the "C-unwind" ABI.

use crate::stack::StackPointer;

// Symbol decoration differs between ELF and Mach-O.
cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        macro_rules! asm_mangle {
            ($name:literal) => { concat!("_", $name) };
        }
    } else {
        macro_rules! asm_mangle {
            ($name:literal) => { $name };
        }
    }
}
cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        // Mach-O
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".private_extern ", asm_mangle!($name), "\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                ""
            };
        }
    } else {
        // Everything else uses ELF.
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".type ", asm_mangle!($name), ", @function\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                concat!(".size ", asm_mangle!($name), ", . - ", asm_mangle!($name), "\n")
            };
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", not(windows)))] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(all(target_arch = "aarch64", not(windows)))] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("Unsupported target");
    }
}

/// Result of a switch: the context pointer of the execution that switched to
/// us (zero if it terminated) and the word it sent along.
///
/// The layout matches what the assembly routines produce in the platform's
/// two-register return convention.
#[repr(C)]
pub struct Transfer {
    pub context: usize,
    pub data: usize,
}

/// Entry point of a new context. Receives the bootstrap transfer and must
/// never return: the frame below it is fabricated and has nothing to return
/// to.
pub type Entry = unsafe extern "C-unwind" fn(Transfer) -> !;

/// Hook run on the target stack by `ontop_context`. Its return value replaces
/// the transfer delivered to the target.
pub type OntopFn = unsafe extern "C-unwind" fn(Transfer) -> Transfer;

extern "C-unwind" {
    fn callcc_jump_context(target: usize, data: usize) -> Transfer;
    fn callcc_ontop_context(target: usize, data: usize, hook: OntopFn) -> Transfer;
}

/// Switches to `target`, delivering `data`. Returns when another execution
/// switches back to this one.
///
/// # Safety
///
/// `target` must be the context pointer of a suspended execution which no
/// other handle refers to.
#[inline]
pub unsafe fn jump_context(target: StackPointer, data: usize) -> Transfer {
    callcc_jump_context(target.get(), data)
}

/// Switches to `target` and runs `hook` on its stack at the suspension point
/// before the target's code continues.
///
/// # Safety
///
/// Same contract as [`jump_context`]; in addition `hook` must be safe to run
/// on the target stack.
#[inline]
pub unsafe fn ontop_context(target: StackPointer, data: usize, hook: OntopFn) -> Transfer {
    callcc_ontop_context(target.get(), data, hook)
}
