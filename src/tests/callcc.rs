use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use crate::stack::{DefaultStack, Preallocated};
use crate::{callcc, callcc_on, callcc_on_with, callcc_with, Continuation};

#[test]
fn one_arg() {
    let value = Rc::new(Cell::new(0));
    let inner = value.clone();
    let c = callcc_with(7, move |c, n: i32| {
        inner.set(n);
        c
    });
    assert_eq!(value.get(), 7);
    assert!(!c.is_resumable());
}

#[test]
fn two_args() {
    let c = callcc_with((3, "abc".to_string()), |c, (n, s): (i32, String)| {
        c.resume_with((n, s))
    });
    assert!(c.is_resumable());
    let (n, s) = unsafe { c.data::<(i32, String)>() };
    assert_eq!(n, 3);
    assert_eq!(s, "abc");
}

#[test]
fn panic_caught_inside() {
    let what = Rc::new(RefCell::new(String::new()));
    let inner = what.clone();
    let c = callcc_with("hello world", move |c, msg: &'static str| {
        let err = panic::catch_unwind(|| panic::panic_any(msg)).unwrap_err();
        inner
            .borrow_mut()
            .push_str(err.downcast_ref::<&str>().unwrap());
        c
    });
    assert_eq!(*what.borrow(), "hello world");
    assert!(!c.is_resumable());
}

#[test]
fn float_survives_switch() {
    let value = Rc::new(Cell::new(0.0));
    let inner = value.clone();
    let c = callcc_with(7.13, move |c, d: f64| {
        inner.set(d + 3.45);
        c
    });
    assert_eq!(value.get(), 10.58);
    assert!(!c.is_resumable());
}

struct Sentinel(Rc<Cell<i32>>);

impl Sentinel {
    fn new(cell: Rc<Cell<i32>>) -> Self {
        cell.set(3);
        Sentinel(cell)
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.0.set(7);
    }
}

#[test]
fn forced_unwind_runs_destructors() {
    let state = Rc::new(Cell::new(0));
    let inner = state.clone();
    let c = callcc(move |c| {
        let _sentinel = Sentinel::new(inner);
        c.resume()
    });
    assert_eq!(state.get(), 3);
    assert!(c.is_resumable());
    drop(c);
    assert_eq!(state.get(), 7);
}

#[test]
fn forced_unwind_drops_in_reverse_order() {
    struct Ordered(&'static str, Rc<RefCell<Vec<&'static str>>>);
    impl Drop for Ordered {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    let order = Rc::new(RefCell::new(Vec::new()));
    let inner = order.clone();
    let c = callcc(move |c| {
        let _first = Ordered("first", inner.clone());
        let _second = Ordered("second", inner.clone());
        c.resume()
    });
    assert!(order.borrow().is_empty());
    drop(c);
    assert_eq!(*order.borrow(), ["second", "first"]);
}

#[test]
fn stacked_spawn() {
    let value1 = Rc::new(Cell::new(0));
    let value3 = Rc::new(Cell::new(0.0));
    let inner1 = value1.clone();
    let inner3 = value3.clone();
    let c = callcc(move |c| {
        let nested = callcc(move |nc| {
            inner1.set(3);
            nc
        });
        if !nested.is_resumable() {
            inner3.set(3.14);
        }
        c
    });
    assert_eq!(value1.get(), 3);
    assert_eq!(value3.get(), 3.14);
    assert!(!c.is_resumable());
}

#[test]
fn terminated_resume_yields_dead_handle() {
    let value = Rc::new(Cell::new(0));
    let inner = value.clone();
    let c = callcc_with(3, move |c, n: i32| {
        inner.set(n);
        let c = c.resume_with(n);
        inner.set(unsafe { c.data::<i32>() });
        c
    });
    assert_eq!(value.get(), 3);
    assert!(c.is_resumable());
    assert_eq!(unsafe { c.data::<i32>() }, 3);
    let c = c.resume_with(7);
    assert!(!c.is_resumable());
    assert!(!c.has_data());
    assert_eq!(value.get(), 7);
}

#[test]
fn has_data_reflects_payload() {
    let c = callcc(|c| {
        let c = c.resume();
        let n = unsafe { c.data::<i32>() };
        c.resume_with(n)
    });
    assert!(!c.has_data());
    let c = c.resume_with(5);
    assert!(c.has_data());
    assert_eq!(unsafe { c.data::<i32>() }, 5);
    let c = c.resume();
    assert!(!c.is_resumable());
}

#[test]
fn ontop_rewrites_payload() {
    let c = callcc_with(3, |mut c, mut x: i32| loop {
        c = c.resume_with(x * 10);
        if c.has_data() {
            x = unsafe { c.data::<i32>() };
        }
    });
    assert!(c.has_data());
    assert_eq!(unsafe { c.data::<i32>() }, 30);
    let c = c.resume_ontop_with(3, |c| unsafe { c.data::<i32>() } - 10);
    assert!(c.is_resumable());
    assert!(c.has_data());
    assert_eq!(unsafe { c.data::<i32>() }, -70);
}

#[test]
fn ontop_multiple_values() {
    let c = callcc_with((3, 1), |mut c, (mut i, mut j): (i32, i32)| loop {
        c = c.resume_with((i, j));
        let (x, y) = unsafe { c.data::<(i32, i32)>() };
        i = x;
        j = y;
    });
    assert_eq!(unsafe { c.data::<(i32, i32)>() }, (3, 1));
    let c = c.resume_ontop_with((3, 1), |c| {
        let (x, y) = unsafe { c.data::<(i32, i32)>() };
        (x - y, x + y)
    });
    assert_eq!(unsafe { c.data::<(i32, i32)>() }, (2, 4));
}

#[test]
fn ontop_unit_hook_delivers_nothing() {
    let c = callcc(|c| {
        let c = c.resume();
        let had_data = c.has_data();
        c.resume_with(had_data)
    });
    let c = c.resume_ontop(|_| ());
    assert!(!unsafe { c.data::<bool>() });
    let c = c.resume();
    assert!(!c.is_resumable());
}

struct Cancel {
    c: Continuation,
    what: &'static str,
}

// The payload only crosses between stacks of one thread.
unsafe impl Send for Cancel {}

#[test]
fn ontop_panic_unwinds_the_target() {
    let value1 = Rc::new(Cell::new(0));
    let value2 = Rc::new(Cell::new(""));
    let inner1 = value1.clone();
    let inner2 = value2.clone();
    let mut c = callcc(move |mut c| loop {
        inner1.set(3);
        match panic::catch_unwind(AssertUnwindSafe(|| c.resume())) {
            Ok(next) => c = next,
            Err(err) => {
                let cancel = err.downcast::<Cancel>().unwrap();
                inner2.set(cancel.what);
                return cancel.c;
            }
        }
    });
    c = c.resume();
    assert_eq!(value1.get(), 3);
    let c = c.resume_ontop(|target: &mut Continuation| -> () {
        panic::panic_any(Cancel {
            c: mem::take(target),
            what: "hello world",
        })
    });
    assert!(!c.is_resumable());
    assert_eq!(value1.get(), 3);
    assert_eq!(value2.get(), "hello world");
}

#[test]
fn move_only_payload() {
    let c = callcc_with(Box::new(7), |c, b: Box<i32>| {
        let c = c.resume_with(b);
        let b = unsafe { c.data::<Box<i32>>() };
        c.resume_with(b)
    });
    let b = unsafe { c.data::<Box<i32>>() };
    assert_eq!(*b, 7);
    let c = c.resume_ontop_with(b, |c| unsafe { c.data::<Box<i32>>() });
    assert!(c.is_resumable());
    let b = unsafe { c.data::<Box<i32>>() };
    assert_eq!(*b, 7);
}

#[test]
fn pointer_payload() {
    let mut y = 7;
    let c = callcc_with(&mut y as *mut i32, |c, p: *mut i32| c.resume_with(p));
    let p = unsafe { c.data::<*mut i32>() };
    assert_eq!(p, &mut y as *mut i32);
    drop(c);
}

#[test]
fn explicit_stack() {
    let stack = DefaultStack::new(256 * 1024).unwrap();
    let value = Rc::new(Cell::new(0));
    let inner = value.clone();
    let c = callcc_on(stack, move |c| {
        inner.set(1);
        c
    });
    assert_eq!(value.get(), 1);
    assert!(!c.is_resumable());
}

#[test]
fn preallocated_stack() {
    let stack = DefaultStack::new(64 * 1024).unwrap();
    let stack = Preallocated::new(16, stack);
    let reserved = stack.reserved_limit().get() as *mut u8;
    unsafe { ptr::write_bytes(reserved, 0xa5, 16) };

    let value = Rc::new(Cell::new(0));
    let inner = value.clone();
    let c = callcc_on_with(stack, 7, move |c, n: i32| {
        inner.set(n);
        c.resume()
    });
    assert_eq!(value.get(), 7);
    assert!(c.is_resumable());
    // The runtime never touches the reserved bytes.
    for i in 0..16 {
        assert_eq!(unsafe { *reserved.add(i) }, 0xa5);
    }
    drop(c);
}

#[test]
fn handle_identity_and_display() {
    let c1 = callcc(|c| c.resume());
    let c2 = callcc(|c| c.resume());
    assert!(c1.is_resumable());
    assert!(c2.is_resumable());
    assert_ne!(c1, c2);
    assert!((c1 < c2) != (c2 < c1));
    assert_ne!(format!("{}", c1), "{not-a-context}");

    let dead = c1.resume();
    assert!(!dead.is_resumable());
    assert_eq!(format!("{}", dead), "{not-a-context}");
    assert_eq!(dead, Continuation::default());

    let dead2 = c2.resume();
    assert_eq!(dead, dead2);
}

#[test]
fn handles_as_ordered_keys() {
    let mut set = BTreeSet::new();
    for _ in 0..3 {
        set.insert(callcc(|c| c.resume()));
    }
    assert_eq!(set.len(), 3);
    // Dropping the set unwinds all three.
}

#[test]
fn deep_stack_use() {
    fn recurse(depth: u32, scratch: &mut [u8; 8192]) {
        unsafe {
            // Keep the allocation from being optimized away.
            ptr::read_volatile(&scratch);
        }
        if depth > 0 {
            recurse(depth - 1, &mut [0; 8192]);
        }
    }

    let c = callcc(|c| {
        // Use ~400KB of the default 1MiB stack.
        recurse(50, &mut [0; 8192]);
        c
    });
    assert!(!c.is_resumable());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "does not match the requested type")]
fn mismatched_payload_type() {
    let c = callcc(|c| c.resume_with(1.0f64));
    let _ = unsafe { c.data::<i32>() };
}

#[test]
#[should_panic(expected = "attempt to resume a dead continuation")]
fn resume_dead_handle() {
    let _ = callcc(|c| c).resume();
}
