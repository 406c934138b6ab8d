use memguard::{MemGuard, Options};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let guard = MemGuard::new();

    let config = guard.allocate(128).ok_or("allocation failed")?;
    let table = guard.allocate_zeroed(16, 8).ok_or("allocation failed")?;
    println!("static phase: {}", guard.is_static_time());

    guard.initialize(Options::from_env());
    println!("static phase: {}", guard.is_static_time());

    let scratch = guard.allocate(24).ok_or("allocation failed")?;
    std::hint::black_box(scratch);

    guard.report();
    guard.report();
    println!("static records: {}", guard.ledger().static_len());

    unsafe {
        guard.release(config.as_ptr());
        guard.release(table.as_ptr());
    }
    guard.report();
    println!("static records: {}", guard.ledger().static_len());

    Ok(())
}
