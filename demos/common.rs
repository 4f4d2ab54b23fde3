//! Shared helpers for the demos.

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Server used when no URL argument is given.
pub const DEFAULT_SERVER: &str = "http://localhost:3000/";

// ============================================================================
// Arguments
// ============================================================================

/// Arguments shared by every demo.
pub struct Args {
    /// Server base URL (first positional argument).
    pub server: String,
    /// Enable trace logging (`--debug`).
    pub debug: bool,
}

impl Args {
    pub fn parse() -> Self {
        let mut server = DEFAULT_SERVER.to_string();
        let mut debug = false;

        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--debug" => debug = true,
                other => server = other.to_string(),
            }
        }
        Self { server, debug }
    }
}

// ============================================================================
// Logging
// ============================================================================

pub fn init_logging(debug: bool) {
    let filter = if debug {
        "socketio_client=trace"
    } else {
        "socketio_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
