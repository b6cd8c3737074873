//! Diagnostic logging.
//!
//! The CLI prints its own progress lines to stdout; `tracing` events go to
//! stderr so they can be silenced or captured separately.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "elt=warn",
        1 => "elt=info",
        _ => "elt=debug,sqlx=info",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `verbosity`.
pub fn init_logging(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    // A subscriber may already be installed (tests, embedding callers).
    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}
