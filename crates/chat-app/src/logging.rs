use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or cannot be parsed.
pub const DEFAULT_LOG_DIRECTIVES: &str = "warn";

/// Installs the global fmt subscriber. Output goes to stderr; stdout carries the chat.
pub fn init() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .init();
}

pub fn env_filter() -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}
