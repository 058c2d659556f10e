use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable: service events from
/// this crate plus request traces from the HTTP layer.
pub const DEFAULT_LOG_FILTER: &str = "threadweave_backend=info,tower_http=info";

/// Installs the fmt subscriber. Safe to call from every entrypoint and test;
/// only the first call takes effect.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::info!("still logging");
    }
}
