//! Stackful symmetric coroutines with explicit value transfer: a
//! `call-with-current-continuation` primitive for Rust.
//!
//! ## Overview
//!
//! This crate provides context switching between call stacks in its symmetric
//! form: there is no built-in notion of a caller to yield to. Every switch
//! names its destination explicitly through a [`Continuation`], a move-only
//! handle to a suspended execution on its own stack. Resuming a continuation
//! consumes the handle and produces a *new* one designating whoever
//! eventually switches back; a typed payload can be carried across every
//! switch in either direction.
//!
//! [`callcc`] spawns a coroutine and immediately switches to it. The
//! coroutine function receives the continuation of its spawner and terminates
//! by returning a continuation, which is where control goes when it is done.
//!
//! ## Example
//!
//! ```rust
//! use callcc::callcc_with;
//!
//! fn main() {
//!     let mut c = callcc_with(1u64, |mut c, mut n: u64| loop {
//!         n *= 2;
//!         c = c.resume_with(n);
//!         n = unsafe { c.data() };
//!     });
//!
//!     for _ in 0..4 {
//!         let doubled: u64 = unsafe { c.data() };
//!         println!("[main] got {}", doubled);
//!         c = c.resume_with(doubled + 1);
//!     }
//!     // Dropping `c` unwinds the loop and frees the coroutine's stack.
//! }
//! ```
//!
//! ## Value transfer
//!
//! Payloads travel by address: the sender materializes the value on its own
//! stack and the receiver decodes it with [`Continuation::data`], moving it
//! out. Sender and receiver agree on the type by convention; the decode is
//! `unsafe` and a mismatch is undefined, though debug builds carry a type tag
//! that turns mismatches into panics. Multiple values travel as a tuple; no
//! payload at all is represented by a null transfer word, observable through
//! [`Continuation::has_data`].
//!
//! ## Cleanup on drop
//!
//! Dropping a live continuation unwinds the target stack with the same
//! mechanism as panics, running the destructors of everything on it, then
//! frees the stack. The unwind payload is a type user code cannot name;
//! a `catch_unwind` inside a coroutine must rethrow payloads it does not
//! recognize, or the teardown protocol breaks.
//!
//! ## Panics
//!
//! A panic thrown by an on-top hook ([`Continuation::resume_ontop`]) unwinds
//! the *target* execution from its suspension point: this is the cancellation
//! mechanism, and such a panic is catchable inside the target like any other.
//! A panic that reaches the root of a coroutine, however, aborts the process:
//! in a symmetric runtime there is no implicit parent to propagate it to.
//! Catch panics before they escape the coroutine function.
//!
//! ## Supported targets
//!
//! | | ELF (Linux, BSD, …) | Darwin (macOS, iOS, …) | Windows |
//! |---------|---|---|---|
//! | x86_64  | ✅ | ✅ | ❌ |
//! | AArch64 | ✅ | ✅ | ❌ |
//!
//! ## Cargo features
//!
//! #### `default-stack` (enabled by default)
//!
//! Provides [`stack::DefaultStack`], an mmap-based stack with a guard page,
//! and the [`callcc`]/[`callcc_with`] entry points that allocate one
//! implicitly. Without it, spawn through [`callcc_on`] with your own
//! [`stack::Stack`] implementation.

#![warn(missing_docs)]

mod arch;
mod continuation;
mod record;
mod transfer;
mod unwind;

pub mod stack;

#[cfg(feature = "default-stack")]
pub use continuation::{callcc, callcc_with};
pub use continuation::{callcc_on, callcc_on_with, Continuation};

#[cfg(test)]
mod tests;
