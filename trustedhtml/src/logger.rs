//! Logger setup for the trustedhtml binary.
//!
//! Logs go to stderr through `env_logger`. `RUST_LOG` is honored unless the
//! command line forces a level; decision tracing has its own target so it can
//! be switched on without the rest of the debug output.
//!
//! License: MIT OR APACHE 2.0

use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use trustedhtml_core::validators::TRACE_TARGET;

/// Initializes the global logger. `level` overrides `RUST_LOG` when given.
pub fn init_logger(level: Option<LevelFilter>, trace: bool) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    if trace {
        builder.filter_module(TRACE_TARGET, LevelFilter::Debug);
    }
    builder.target(Target::Stderr).format_timestamp(None);

    // A second initialization (tests) keeps the first logger.
    let _ = builder.try_init();
}
