use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};

use crate::arch::{self, Transfer};
#[cfg(feature = "default-stack")]
use crate::stack::DefaultStack;
use crate::stack::{Stack, StackPointer};
use crate::record::{Invoke, Record};
use crate::transfer::{decode_payload, payload_word, Payload};
use crate::unwind;

/// A handle to a suspended execution with its own stack.
///
/// A continuation is a one-shot, move-only resource: resuming it consumes the
/// handle and returns a *new* continuation designating whoever switches back.
/// The returned handle is dead (see [`is_resumable`]) when the execution it
/// would designate has terminated.
///
/// Dropping a live continuation unwinds the target stack, running the
/// destructors of everything on it, and then frees the stack. See the crate
/// documentation for the rules panics are subject to.
///
/// # Thread safety
///
/// `Continuation` is neither `Send` nor `Sync`. The runtime itself keeps no
/// thread state, but the objects on a suspended stack may, and Rust cannot
/// check them; if every object that can live on the stack at a suspension
/// point is known to be `Send`, a wrapper with a manual `Send`
/// implementation is sound.
///
/// [`is_resumable`]: Continuation::is_resumable
pub struct Continuation {
    context: Option<StackPointer>,
    data: usize,
    marker: PhantomData<*mut ()>,
}

impl Continuation {
    pub(crate) fn from_raw(context: usize, data: usize) -> Self {
        Continuation {
            context: StackPointer::new(context),
            data,
            marker: PhantomData,
        }
    }

    pub(crate) fn from_transfer(t: Transfer) -> Self {
        Self::from_raw(t.context, t.data)
    }

    /// Consumes the handle without triggering an unwind.
    fn into_parts(self) -> (Option<StackPointer>, usize) {
        let this = ManuallyDrop::new(self);
        (this.context, this.data)
    }

    fn into_target(self) -> StackPointer {
        match self.into_parts().0 {
            Some(context) => context,
            None => panic!("attempt to resume a dead continuation"),
        }
    }

    /// Returns whether this handle designates a suspended execution.
    ///
    /// Handles returned from a resume are dead when the resumed execution
    /// terminated instead of switching back; so are default-constructed
    /// handles. Resuming a dead handle panics.
    pub fn is_resumable(&self) -> bool {
        self.context.is_some()
    }

    /// Resumes the target execution with no payload.
    ///
    /// Returns when some execution switches back to this one; the returned
    /// continuation designates it (and is dead if it terminated).
    ///
    /// # Panics
    ///
    /// Panics if the handle is dead.
    pub fn resume(self) -> Continuation {
        self.resume_with(())
    }

    /// Resumes the target execution, transferring `value`.
    ///
    /// The value is decoded on the other side with [`data`](Self::data) using
    /// the same type. Multiple values travel as a tuple. If the receiver
    /// never decodes it, the value is leaked, not dropped.
    ///
    /// # Panics
    ///
    /// Panics if the handle is dead.
    pub fn resume_with<T: 'static>(self, value: T) -> Continuation {
        let target = self.into_target();
        let mut payload = Payload::new(value);
        let t = unsafe { arch::jump_context(target, payload_word(&mut payload)) };
        Continuation::from_transfer(t)
    }

    /// Resumes the target execution with a hook inserted at its suspension
    /// point.
    ///
    /// The hook runs on the target stack before the target's own code
    /// continues, and receives the continuation designating this (now
    /// suspended) execution. Its return value replaces the payload the target
    /// observes; a hook returning `()` delivers no payload. The hook may
    /// swap in a different continuation to redirect the transfer, or move the
    /// continuation into a panic payload: a panicking hook unwinds the target
    /// from its suspension point, which is how a suspended execution is
    /// cancelled with a catchable error. Letting the continuation drop
    /// inside the hook unwinds this execution instead and is almost never
    /// intended.
    ///
    /// # Panics
    ///
    /// Panics if the handle is dead.
    pub fn resume_ontop<R, F>(self, hook: F) -> Continuation
    where
        R: 'static,
        F: FnOnce(&mut Continuation) -> R + 'static,
    {
        self.resume_ontop_with((), hook)
    }

    /// [`resume_ontop`](Self::resume_ontop) with arguments for the hook.
    ///
    /// `value` is made available to the hook through
    /// [`data`](Self::data) on the continuation it receives.
    ///
    /// # Panics
    ///
    /// Panics if the handle is dead.
    pub fn resume_ontop_with<T, R, F>(self, value: T, hook: F) -> Continuation
    where
        T: 'static,
        R: 'static,
        F: FnOnce(&mut Continuation) -> R + 'static,
    {
        let target = self.into_target();
        let mut frame = OntopFrame::<T, R, F> {
            hook: ManuallyDrop::new(hook),
            args: Payload::new(value),
            result: MaybeUninit::uninit(),
        };
        let t = unsafe {
            arch::ontop_context(
                target,
                &mut frame as *mut OntopFrame<T, R, F> as usize,
                ontop_entry::<T, R, F>,
            )
        };
        Continuation::from_transfer(t)
    }

    /// Returns whether the switch that produced this handle carried a
    /// payload.
    pub fn has_data(&self) -> bool {
        self.data != 0
    }

    /// Decodes the payload delivered by the switch that produced this handle.
    ///
    /// # Safety
    ///
    /// `T` must be the type the sender encoded (checked in debug builds),
    /// the payload must be decoded at most once, and it must be decoded
    /// before the sender is resumed, since the frame lives on the sender's
    /// stack.
    pub unsafe fn data<T: 'static>(&self) -> T {
        decode_payload(self.data)
    }
}

impl Default for Continuation {
    /// Creates a dead handle designating no execution.
    fn default() -> Self {
        Continuation {
            context: None,
            data: 0,
            marker: PhantomData,
        }
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if let Some(target) = self.context.take() {
            // Unwind the target; control returns here once its record and
            // stack are gone.
            unsafe {
                arch::ontop_context(target, 0, unwind::forced_unwind_hook);
            }
        }
    }
}

// Identity and order are those of the context pointer; the payload word is
// transient state and takes no part in them.

impl PartialEq for Continuation {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context
    }
}

impl Eq for Continuation {}

impl PartialOrd for Continuation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Continuation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.context.cmp(&other.context)
    }
}

impl Hash for Continuation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.hash(state);
    }
}

impl fmt::Display for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context {
            Some(context) => write!(f, "{:#x}", context.get()),
            None => f.write_str("{not-a-context}"),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Continuation({})", self)
    }
}

struct OntopFrame<T, R, F> {
    hook: ManuallyDrop<F>,
    args: Payload<T>,
    result: MaybeUninit<Payload<R>>,
}

unsafe extern "C-unwind" fn ontop_entry<T, R, F>(t: Transfer) -> Transfer
where
    T: 'static,
    R: 'static,
    F: FnOnce(&mut Continuation) -> R + 'static,
{
    let frame = t.data as *mut OntopFrame<T, R, F>;
    let hook = ManuallyDrop::take(&mut (*frame).hook);
    let mut from = Continuation::from_raw(t.context, payload_word(&mut (*frame).args));

    // Runs on the target stack; a panic from here unwinds the target.
    let result = hook(&mut from);

    let (context, _) = from.into_parts();
    let next = match context {
        Some(context) => context.get(),
        None => panic!("on-top hook left a dead continuation behind"),
    };
    let result = (*frame).result.write(Payload::new(result));
    Transfer {
        context: next,
        data: payload_word(result),
    }
}

/// Adapter running a user function that takes only the continuation.
pub(crate) struct VoidFn<F>(pub F);

impl<F> Invoke for VoidFn<F>
where
    F: FnOnce(Continuation) -> Continuation + 'static,
{
    fn invoke(self, t: Transfer) -> StackPointer {
        exit_target((self.0)(Continuation::from_transfer(t)))
    }
}

/// Adapter running a user function that also takes the spawn payload,
/// decoded into its typed second argument.
pub(crate) struct ArgFn<F, T> {
    func: F,
    marker: PhantomData<fn(T)>,
}

impl<F, T> ArgFn<F, T> {
    pub(crate) fn new(func: F) -> Self {
        ArgFn {
            func,
            marker: PhantomData,
        }
    }
}

impl<F, T> Invoke for ArgFn<F, T>
where
    T: 'static,
    F: FnOnce(Continuation, T) -> Continuation + 'static,
{
    fn invoke(self, t: Transfer) -> StackPointer {
        let value = unsafe { decode_payload::<T>(t.data) };
        // The payload is consumed into the argument, so the continuation the
        // function receives carries no queryable data.
        let from = Continuation::from_raw(t.context, 0);
        exit_target((self.func)(from, value))
    }
}

fn exit_target(c: Continuation) -> StackPointer {
    match c.into_parts().0 {
        Some(context) => context,
        // The panic aborts once it reaches the context root: an execution
        // with a dead exit target has nowhere to terminate to.
        None => panic!("continuation function returned a dead continuation"),
    }
}

/// Spawns a coroutine on a [`DefaultStack`] and switches to it.
///
/// `f` runs on the new stack and receives the continuation of the spawning
/// execution. It must return the continuation to terminate to: normally the
/// one it received, or whatever handle it last got back from a resume.
///
/// The call returns when the coroutine first switches back (or terminates).
///
/// # Panics
///
/// Panics if the stack cannot be allocated. Use [`callcc_on`] with a
/// caller-allocated stack to handle allocation failure.
#[cfg(feature = "default-stack")]
pub fn callcc<F>(f: F) -> Continuation
where
    F: FnOnce(Continuation) -> Continuation + 'static,
{
    callcc_on(DefaultStack::default(), f)
}

/// Spawns a coroutine on a [`DefaultStack`], transferring `value` to it.
///
/// Like [`callcc`], but the coroutine function receives the payload decoded
/// into its second argument.
#[cfg(feature = "default-stack")]
pub fn callcc_with<T, F>(value: T, f: F) -> Continuation
where
    T: 'static,
    F: FnOnce(Continuation, T) -> Continuation + 'static,
{
    callcc_on_with(DefaultStack::default(), value, f)
}

/// Spawns a coroutine on the given stack. See [`callcc`].
pub fn callcc_on<S, F>(stack: S, f: F) -> Continuation
where
    S: Stack + 'static,
    F: FnOnce(Continuation) -> Continuation + 'static,
{
    let parked = Record::create(stack, VoidFn(f));
    Continuation::from_raw(parked.get(), 0).resume()
}

/// Spawns a coroutine on the given stack, transferring `value` to it. See
/// [`callcc_with`].
pub fn callcc_on_with<S, T, F>(stack: S, value: T, f: F) -> Continuation
where
    S: Stack + 'static,
    T: 'static,
    F: FnOnce(Continuation, T) -> Continuation + 'static,
{
    let parked = Record::create(stack, ArgFn::new(f));
    Continuation::from_raw(parked.get(), 0).resume_with(value)
}
