use memguard::{MemGuard, Options};
use std::sync::Arc;

const THREADS: usize = 8;
const PER_THREAD: usize = 1000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let guard = Arc::new(MemGuard::new());
    guard.initialize(Options::from_env());

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let guard = Arc::clone(&guard);
            std::thread::spawn(move || {
                (0..PER_THREAD)
                    .filter_map(|j| guard.allocate(1 + (i * PER_THREAD + j) % 64))
                    .map(|ptr| ptr.as_ptr() as usize)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut addresses = Vec::with_capacity(THREADS * PER_THREAD);
    for handle in handles {
        addresses.extend(handle.join().map_err(|_| "worker panicked")?);
    }
    println!("records: {}", guard.ledger().len());

    let releasers: Vec<_> = addresses
        .chunks(PER_THREAD)
        .map(|chunk| {
            let guard = Arc::clone(&guard);
            let chunk = chunk.to_vec();
            std::thread::spawn(move || {
                for address in chunk {
                    unsafe { guard.release(address as *mut u8) };
                }
            })
        })
        .collect();
    for handle in releasers {
        handle.join().map_err(|_| "worker panicked")?;
    }

    println!("records after release: {}", guard.ledger().len());
    guard.report();

    Ok(())
}
