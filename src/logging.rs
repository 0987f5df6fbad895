//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns false when a global subscriber was already set.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
