//! Profiling utilities based on the `puffin` crate.
//!
//! With the `profiling` feature disabled the scope macros expand to nothing and the
//! frame functions are no-ops, so call sites never need their own `cfg`.

#[cfg(feature = "profiling")]
pub use puffin::{profile_function, profile_scope};

#[cfg(not(feature = "profiling"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __sprocket_profile_noop {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "profiling"))]
pub use crate::__sprocket_profile_noop as profile_function;
#[cfg(not(feature = "profiling"))]
pub use crate::__sprocket_profile_noop as profile_scope;

/// Profiling backend options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingBackend {
    /// Send profiling data to puffin_viewer via HTTP.
    PuffinHttp,
}

#[cfg(feature = "profiling")]
static PROFILING_SERVER: std::sync::OnceLock<puffin_http::Server> = std::sync::OnceLock::new();

/// Port the puffin HTTP server listens on.
pub const PUFFIN_PORT: u16 = 8585;

/// Initialize profiling with the specified backend.
///
/// # Example
/// ```no_run
/// use sprocket_core::profiling::{init_profiling, ProfilingBackend};
///
/// init_profiling(ProfilingBackend::PuffinHttp);
/// ```
pub fn init_profiling(backend: ProfilingBackend) {
    match backend {
        #[cfg(feature = "profiling")]
        ProfilingBackend::PuffinHttp => {
            puffin::set_scopes_on(true);

            let address = format!("0.0.0.0:{PUFFIN_PORT}");
            match puffin_http::Server::new(&address) {
                Ok(server) => {
                    tracing::info!("Puffin profiler server started on http://{}", address);
                    let _ = PROFILING_SERVER.set(server);
                }
                Err(e) => {
                    tracing::error!("Failed to start puffin server: {}", e);
                }
            }
        }
        #[cfg(not(feature = "profiling"))]
        ProfilingBackend::PuffinHttp => {
            tracing::warn!("profiling requested but the `profiling` feature is disabled");
        }
    }
}

/// Mark the start of a new frame for profiling.
///
/// Call this once per frame so scopes are grouped by frame in the viewer.
#[inline]
pub fn new_frame() {
    #[cfg(feature = "profiling")]
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped_work() -> u32 {
        profile_function!();
        let mut total = 0;
        for i in 0..4 {
            profile_scope!("step");
            total += i;
        }
        total
    }

    #[test]
    fn test_scopes_run_without_server() {
        new_frame();
        assert_eq!(scoped_work(), 6);
        new_frame();
    }
}
