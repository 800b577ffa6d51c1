use tracing_subscriber::{fmt, EnvFilter};

/// Logs go to stderr so that stdout stays parseable with `--json`.
pub fn init_logger(verbose: bool) {
    // RUST_LOG wins; otherwise quiet unless --verbose
    let default_level = if verbose { "info" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_target(true)
        .with_ansi(true)
        .init();
}
