use callcc::{callcc_with, Continuation};

fn main() {
    // A coroutine that multiplies whatever it receives by 10.
    let mut c = callcc_with(3, |mut c: Continuation, mut x: i32| loop {
        c = c.resume_with(x * 10);
        if c.has_data() {
            x = unsafe { c.data() };
        }
    });

    println!("[main] plain resume: {}", unsafe { c.data::<i32>() });

    // The hook runs on the coroutine's stack before it continues and rewrites
    // the payload it observes.
    c = c.resume_ontop_with(3, |c: &mut Continuation| {
        let x = unsafe { c.data::<i32>() };
        println!("[hook] rewriting {} to {}", x, x - 10);
        x - 10
    });

    println!("[main] after on-top rewrite: {}", unsafe {
        c.data::<i32>()
    });

    drop(c); // unwinds the coroutine's loop and frees its stack
}
