//! Typed payloads for the one-word transfer channel.
//!
//! A switch carries a single machine word. Payloads are materialized as a
//! [`Payload`] frame on the sender's stack and the word is the frame's
//! address; the receiver decodes it through the statically expected type. A
//! zero-sized payload is represented by a null word instead, which is what
//! `has_data` reports on.
//!
//! The frame lives on the sender's stack and is only valid until the sender
//! is resumed, and decoding moves the value out, so a payload may be decoded
//! at most once. Both rules are enforced by the receiver's `unsafe` contract;
//! in debug builds a type tag catches mismatched decodes.

use std::mem::{size_of, ManuallyDrop};
use std::ptr::{self, NonNull};

#[cfg(debug_assertions)]
use std::any::TypeId;

/// A value in flight across a switch, resident on the sender's stack.
pub struct Payload<T> {
    #[cfg(debug_assertions)]
    tag: TypeId,
    value: ManuallyDrop<T>,
}

impl<T: 'static> Payload<T> {
    pub fn new(value: T) -> Self {
        Payload {
            #[cfg(debug_assertions)]
            tag: TypeId::of::<T>(),
            value: ManuallyDrop::new(value),
        }
    }
}

/// Returns the transfer word for a payload frame: its address, or null for a
/// zero-sized payload.
pub fn payload_word<T>(payload: &mut Payload<T>) -> usize {
    if size_of::<T>() == 0 {
        0
    } else {
        payload as *mut Payload<T> as usize
    }
}

/// Decodes the payload behind a transfer word, moving the value out of the
/// sender's frame.
///
/// # Safety
///
/// `word` must come from a sender that encoded a `T`, the sender must still
/// be suspended, and the word must not have been decoded before.
pub unsafe fn decode_payload<T: 'static>(word: usize) -> T {
    if size_of::<T>() == 0 {
        // Zero-sized payloads travel as a null word and are conjured on the
        // receiving side.
        return ptr::read(NonNull::<T>::dangling().as_ptr());
    }
    assert!(word != 0, "no data was transferred with the last switch");
    let payload = word as *mut Payload<T>;
    #[cfg(debug_assertions)]
    assert!(
        (*payload).tag == TypeId::of::<T>(),
        "transferred data does not match the requested type",
    );
    ManuallyDrop::take(&mut (*payload).value)
}
