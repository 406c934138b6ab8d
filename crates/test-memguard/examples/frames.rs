use memguard::{MemGuard, Options};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let guard = MemGuard::new();
    guard.initialize(Options::from_env().no_base_path());

    guard.begin_frame()?;
    let kept = guard.allocate(40).ok_or("allocation failed")?;
    let freed = guard.allocate(8).ok_or("allocation failed")?;
    unsafe { guard.release(freed.as_ptr()) };
    let frame = guard.end_frame()?;

    println!("outstanding: {}", frame.len());
    if let Some(text) = guard.frame_to_text(&frame) {
        print!("{text}");
    }
    guard.destroy_frame_chain(frame);

    // Closing twice is reported through the sink
    let _ = guard.end_frame();

    unsafe { guard.release(kept.as_ptr()) };
    guard.report();

    Ok(())
}
