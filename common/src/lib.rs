use env_logger::{Builder, Env};

/// Loads variables from `.env` (if present) and initialises the logger.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn setup_env() {
    dotenvy::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Splits a comma separated value into trimmed, non-empty parts.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}
