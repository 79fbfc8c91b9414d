use callcc::callcc_with;

fn main() {
    println!("[main] spawning coroutine");

    let mut c = callcc_with(100, |mut c, mut input: i32| {
        println!("[coroutine] started with input {}", input);
        for i in 0..5 {
            println!("[coroutine] sending {}", i);
            c = c.resume_with(i);
            input = unsafe { c.data() };
            println!("[coroutine] got {} back", input);
        }
        println!("[coroutine] done");
        c
    });

    let mut counter = 100;
    while c.is_resumable() {
        let received: i32 = unsafe { c.data() };
        println!("[main] got {} from coroutine", received);
        counter += 1;
        println!("[main] resuming with {}", counter);
        c = c.resume_with(counter);
    }

    println!("[main] coroutine terminated");
}
