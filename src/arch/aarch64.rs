//! AArch64 (AAPCS64) backend.
//!
//! ## Saved frame layout
//!
//! ```text
//! +--------------+  <- context pointer
//! | D8  | D9     |  0x00
//! | D10 | D11    |  0x10
//! | D12 | D13    |  0x20
//! | D14 | D15    |  0x30
//! | X19 | X20    |  0x40
//! | X21 | X22    |  0x50
//! | X23 | X24    |  0x60
//! | X25 | X26    |  0x70
//! | X27 | X28    |  0x80
//! | X29 | X30    |  0x90
//! +--------------+
//! | Resume PC    |  0xa0  where the context continues when switched to
//! | (padding)    |  0xa8
//! +--------------+
//! ```
//!
//! Unlike x86_64 there is no pushed return address: the resume point of a
//! context suspended in `callcc_jump_context` is its link register, stored in
//! both the X30 slot and the resume slot. A fabricated frame instead stores
//! the entry trampoline in the resume slot and the entry function in the X19
//! slot.
//!
//! The transfer travels in X0:X1 both as the two-register struct return of
//! `callcc_jump_context` and as the argument pair of the entry function and
//! on-top hook, so no register shuffling is needed on arrival.

use std::arch::global_asm;

use super::Entry;
use crate::stack::StackPointer;

pub const STACK_ALIGNMENT: usize = 16;

const FRAME_SIZE: usize = 0xb0;

global_asm!(
    ".balign 16",
    asm_function_begin!("callcc_jump_context"),
    ".cfi_startproc",
    "sub sp, sp, #0xb0",
    "stp d8, d9, [sp, #0x00]",
    "stp d10, d11, [sp, #0x10]",
    "stp d12, d13, [sp, #0x20]",
    "stp d14, d15, [sp, #0x30]",
    "stp x19, x20, [sp, #0x40]",
    "stp x21, x22, [sp, #0x50]",
    "stp x23, x24, [sp, #0x60]",
    "stp x25, x26, [sp, #0x70]",
    "stp x27, x28, [sp, #0x80]",
    "stp x29, x30, [sp, #0x90]",
    // Our own resume point is simply the return address.
    "str x30, [sp, #0xa0]",
    "mov x16, sp",
    // Switch to the target context.
    "mov sp, x0",
    "mov x0, x16",
    "ldp d8, d9, [sp, #0x00]",
    "ldp d10, d11, [sp, #0x10]",
    "ldp d12, d13, [sp, #0x20]",
    "ldp d14, d15, [sp, #0x30]",
    "ldp x19, x20, [sp, #0x40]",
    "ldp x21, x22, [sp, #0x50]",
    "ldp x23, x24, [sp, #0x60]",
    "ldp x25, x26, [sp, #0x70]",
    "ldp x27, x28, [sp, #0x80]",
    "ldp x29, x30, [sp, #0x90]",
    "ldr x17, [sp, #0xa0]",
    "add sp, sp, #0xb0",
    // X0:X1 now carry the transfer; X1 still holds the data word.
    "ret x17",
    ".cfi_endproc",
    asm_function_end!("callcc_jump_context"),
);

global_asm!(
    ".balign 16",
    asm_function_begin!("callcc_ontop_context"),
    ".cfi_startproc",
    "sub sp, sp, #0xb0",
    "stp d8, d9, [sp, #0x00]",
    "stp d10, d11, [sp, #0x10]",
    "stp d12, d13, [sp, #0x20]",
    "stp d14, d15, [sp, #0x30]",
    "stp x19, x20, [sp, #0x40]",
    "stp x21, x22, [sp, #0x50]",
    "stp x23, x24, [sp, #0x60]",
    "stp x25, x26, [sp, #0x70]",
    "stp x27, x28, [sp, #0x80]",
    "stp x29, x30, [sp, #0x90]",
    "str x30, [sp, #0xa0]",
    "mov x16, sp",
    "mov sp, x0",
    "mov x0, x16",
    "ldp d8, d9, [sp, #0x00]",
    "ldp d10, d11, [sp, #0x10]",
    "ldp d12, d13, [sp, #0x20]",
    "ldp d14, d15, [sp, #0x30]",
    "ldp x19, x20, [sp, #0x40]",
    "ldp x21, x22, [sp, #0x50]",
    "ldp x23, x24, [sp, #0x60]",
    "ldp x25, x26, [sp, #0x70]",
    "ldp x27, x28, [sp, #0x80]",
    "ldp x29, x30, [sp, #0x90]",
    // The hook returns into the target's resume point with its result in
    // X0:X1, exactly as if the target's own switch had delivered it.
    "ldr x30, [sp, #0xa0]",
    "add sp, sp, #0xb0",
    "br x2",
    ".cfi_endproc",
    asm_function_end!("callcc_ontop_context"),
);

global_asm!(
    ".balign 16",
    asm_function_begin!("callcc_entry_trampoline"),
    ".cfi_startproc",
    // Entered by the first switch into a fabricated frame. X0:X1 carry the
    // transfer and X19 holds the entry function, restored from the frame by
    // callcc_jump_context.
    //
    // The entry function never returns; the link register only terminates
    // the frame chain with something recognizable.
    "mov x29, xzr",
    "adr x30, 2f",
    "br x19",
    "2:",
    "brk #0x1",
    ".cfi_endproc",
    asm_function_end!("callcc_entry_trampoline"),
);

extern "C" {
    fn callcc_entry_trampoline();
}

/// Fabricates a saved frame at the top of a stack so that the first switch to
/// the returned context pointer enters `entry`.
///
/// # Safety
///
/// `top` must point at least `FRAME_SIZE` bytes above writable memory and be
/// aligned to [`STACK_ALIGNMENT`].
pub unsafe fn init_context(top: StackPointer, entry: Entry) -> StackPointer {
    debug_assert_eq!(top.get() % STACK_ALIGNMENT, 0);
    let frame = top.get() - FRAME_SIZE;

    let slot = |offset: usize| (frame + offset) as *mut usize;
    slot(0x40).write(entry as usize); // x19: picked up by the trampoline
    slot(0x48).write(0); // x20
    slot(0x90).write(0); // x29: the frame chain ends here
    slot(0x98).write(0); // x30: overwritten by the trampoline
    slot(0xa0).write(callcc_entry_trampoline as usize);

    StackPointer::new_unchecked(frame)
}
