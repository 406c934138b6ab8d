use memguard::{MemGuardAlloc, Options};

#[global_allocator]
static GLOBAL: MemGuardAlloc = MemGuardAlloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let guard = memguard::global();
    guard.initialize(Options::from_env().no_base_path());

    let freed = vec![0u8; 256];
    drop(freed);

    let leaked: &'static mut [u8] = Box::leak(vec![7u8; 4096].into_boxed_slice());
    println!("leaked {} bytes, owned: {}", leaked.len(), guard.is_owned(leaked.as_ptr()));

    guard.report();
    println!("owned after report: {}", guard.is_owned(leaked.as_ptr()));

    Ok(())
}
