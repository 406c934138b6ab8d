use memguard::{MemGuard, Options};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let guard = MemGuard::new();
    guard.initialize(Options::from_env().no_base_path());

    unsafe { guard.release(0xDEAD as *mut u8) };
    println!("owned: {}", guard.is_owned(0xDEAD as *const u8));

    let ptr = guard.allocate(16).ok_or("allocation failed")?;
    unsafe {
        guard.release(ptr.as_ptr());
        guard.release(ptr.as_ptr());
    }

    guard.report();
    Ok(())
}
