//! Logging setup on top of `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

/// Verbose for sprocket itself, quiet for the graphics stack underneath it.
pub const DEFAULT_FILTER: &str =
    "info,sprocket_core=debug,sprocket_render=debug,wgpu_core=warn,wgpu_hal=warn,naga=warn,winit=warn";

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins when set, otherwise [`DEFAULT_FILTER`] applies. Calling this more
/// than once keeps the first subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

/// Installs the global fmt subscriber with explicit filter directives.
pub fn init_with_filter(directives: &str) {
    install(EnvFilter::new(directives));
}

fn install(filter: EnvFilter) {
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("global subscriber already installed");
    }
}
