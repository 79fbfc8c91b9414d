//! x86_64 (SysV) backend.
//!
//! ## Saved frame layout
//!
//! A suspended context is identified by the address of its saved frame, which
//! sits at the top of the live area of its stack:
//!
//! ```text
//! +--------------+  <- context pointer
//! | MXCSR | FCW  |  0x00  SSE and x87 control words
//! +--------------+
//! | R12          |  0x08
//! | R13          |  0x10
//! | R14          |  0x18
//! | R15          |  0x20
//! | RBX          |  0x28
//! | RBP          |  0x30
//! +--------------+
//! | Resume RIP   |  0x38  where the context continues when switched to
//! +--------------+
//! ```
//!
//! For a context suspended inside `callcc_jump_context` the resume address is
//! the return address pushed by the call instruction, so resuming is a plain
//! register restore followed by `ret`. For a freshly initialized context the
//! frame is fabricated by `init_context`: the resume address points at the
//! entry trampoline and the RBX slot holds the Rust entry function, which the
//! trampoline tail-calls.
//!
//! `ontop_context` restores the target frame but, instead of returning,
//! jumps to the hook with the transfer already in the argument registers. The
//! return address left on the stack is the target's resume point, so the hook
//! runs as if called from there: returning delivers its transfer_t-shaped
//! result straight into the target's pending switch, and unwinding proceeds
//! through the target's ordinary frames.

use std::arch::{asm, global_asm};

use super::Entry;
use crate::stack::StackPointer;

pub const STACK_ALIGNMENT: usize = 16;

const FRAME_SIZE: usize = 0x40;

global_asm!(
    ".balign 16",
    asm_function_begin!("callcc_jump_context"),
    ".cfi_startproc",
    // The call into this function already pushed the resume address; carve
    // out the rest of the frame below it.
    "lea rsp, [rsp - 0x38]",
    "stmxcsr [rsp]",
    "fnstcw [rsp + 0x4]",
    "mov [rsp + 0x08], r12",
    "mov [rsp + 0x10], r13",
    "mov [rsp + 0x18], r14",
    "mov [rsp + 0x20], r15",
    "mov [rsp + 0x28], rbx",
    "mov [rsp + 0x30], rbp",
    // RAX doubles as the first half of the returned transfer and as the
    // source for the entry function argument below.
    "mov rax, rsp",
    // Switch to the target context.
    "mov rsp, rdi",
    "ldmxcsr [rsp]",
    "fldcw [rsp + 0x4]",
    "mov r12, [rsp + 0x08]",
    "mov r13, [rsp + 0x10]",
    "mov r14, [rsp + 0x18]",
    "mov r15, [rsp + 0x20]",
    "mov rbx, [rsp + 0x28]",
    "mov rbp, [rsp + 0x30]",
    "lea rsp, [rsp + 0x38]",
    // The transfer is returned in RAX:RDX and simultaneously placed in
    // RDI:RSI so that the entry trampoline can pass it on as the argument of
    // the entry function. RSI already holds the data word.
    "mov rdx, rsi",
    "mov rdi, rax",
    "ret",
    ".cfi_endproc",
    asm_function_end!("callcc_jump_context"),
);

global_asm!(
    ".balign 16",
    asm_function_begin!("callcc_ontop_context"),
    ".cfi_startproc",
    // Keep the hook out of the argument registers while we switch.
    "mov r8, rdx",
    "lea rsp, [rsp - 0x38]",
    "stmxcsr [rsp]",
    "fnstcw [rsp + 0x4]",
    "mov [rsp + 0x08], r12",
    "mov [rsp + 0x10], r13",
    "mov [rsp + 0x18], r14",
    "mov [rsp + 0x20], r15",
    "mov [rsp + 0x28], rbx",
    "mov [rsp + 0x30], rbp",
    "mov rax, rsp",
    "mov rsp, rdi",
    "ldmxcsr [rsp]",
    "fldcw [rsp + 0x4]",
    "mov r12, [rsp + 0x08]",
    "mov r13, [rsp + 0x10]",
    "mov r14, [rsp + 0x18]",
    "mov r15, [rsp + 0x20]",
    "mov rbx, [rsp + 0x28]",
    "mov rbp, [rsp + 0x30]",
    "lea rsp, [rsp + 0x38]",
    // The target's resume address stays on the stack: it becomes the return
    // address of the hook, which receives the transfer in RDI:RSI and leaves
    // its result in RAX:RDX for the target's pending switch.
    "mov rdi, rax",
    "jmp r8",
    ".cfi_endproc",
    asm_function_end!("callcc_ontop_context"),
);

global_asm!(
    ".balign 16",
    asm_function_begin!("callcc_entry_trampoline"),
    ".cfi_startproc",
    // Entered by the first switch into a fabricated frame. RDI:RSI carry the
    // transfer and RBX holds the entry function, both placed there by
    // init_context via the register restore in callcc_jump_context.
    //
    // The entry function never returns; the pushed address only terminates
    // the frame chain with something recognizable.
    "lea rcx, [rip + 2f]",
    "push rcx",
    "jmp rbx",
    "2:",
    "ud2",
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

    // The first switch restores the control words from the frame, so seed
    // them with the current thread's values.
    asm!(
        "stmxcsr [{frame}]",
        "fnstcw [{frame} + 0x4]",
        frame = in(reg) frame,
        options(nostack),
    );

    let slot = |offset: usize| (frame + offset) as *mut usize;
    slot(0x08).write(0); // r12
    slot(0x10).write(0); // r13
    slot(0x18).write(0); // r14
    slot(0x20).write(0); // r15
    slot(0x28).write(entry as usize); // rbx: picked up by the trampoline
    slot(0x30).write(0); // rbp: the frame chain ends here
    slot(0x38).write(callcc_entry_trampoline as usize);

    StackPointer::new_unchecked(frame)
}
