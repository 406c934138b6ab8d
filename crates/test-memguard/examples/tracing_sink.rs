use memguard::{MemGuard, Options, TracingSink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .init();

    let guard = MemGuard::new();
    guard.set_log_sink(TracingSink);
    guard.initialize(Options::from_env().no_base_path());

    let leaked = guard.allocate(72).ok_or("allocation failed")?;
    std::hint::black_box(leaked);
    guard.report();

    guard.reset_log_sink();
    guard.emit("back on the console");

    Ok(())
}
