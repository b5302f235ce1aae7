use std::io;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "HMA_LOG_LEVEL";

/// stderr only, so stdout carries nothing but the analysis output.
pub fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("log_init_error: subscriber already set");
    }
}
