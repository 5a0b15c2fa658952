//! # labres
//!
//! Lab equipment borrow and upkeep server.
//!
//! - [`api`]: axum HTTP API
//! - [`cli`]: clap commands
//! - [`config`]: TOML configuration
//! - [`jobs`]: calibration refresh and return reminders on a timer
//!
//! All scheduling and billing rules live in [`labres_core`]; this crate
//! reads the wall clock and passes it in.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;

pub use labres_core;

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("labres=info,labres_core=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
