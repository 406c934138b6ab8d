use memguard::{MemGuard, Options};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let guard = MemGuard::new();
    guard.initialize(Options::from_env());

    let a = guard.allocate(8).ok_or("allocation failed")?;
    let b = guard.allocate(40).ok_or("allocation failed")?;
    println!("tracked: {}", guard.ledger().len());

    unsafe { guard.release(a.as_ptr()) };
    std::hint::black_box(b);

    guard.report();
    println!("after report: {}", guard.ledger().len());

    Ok(())
}
