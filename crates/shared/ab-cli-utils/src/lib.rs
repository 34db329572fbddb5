//! Utilities used in plotting CLI applications

use std::panic;
use std::process::exit;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Install a panic handler which exits with non-zero code on panics, rather than unwinding
pub fn set_exit_on_panic() {
    let default_panic_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        default_panic_hook(panic_info);
        exit(1);
    }));
}

/// Initialize logging to stderr, `INFO` level unless overridden with `RUST_LOG`
pub fn init_logger() {
    tracing_subscriber::registry()
        .with(
            fmt::layer().with_writer(std::io::stderr).with_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            ),
        )
        .init();
}
