#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod cache;
pub mod compiler;
pub mod config;
pub mod depend;
mod error;
pub mod file;
pub mod global;
pub mod graph;
pub mod io;
pub mod markdown;
pub mod request;
pub mod resolve;
pub mod session;
#[cfg(test)]
mod testing;
#[cfg(feature = "live")]
pub mod watch;
pub mod xcx;

pub use crate::config::Config;
pub use crate::error::*;
pub use crate::graph::{NodeOptions, Visitor, XcxNode};
pub use crate::markdown::Markdown;
pub use crate::request::{Request, RequestOptions, RequestType};
pub use crate::resolve::Resolver;
pub use crate::session::BuildSession;
#[cfg(feature = "live")]
pub use crate::watch::watch;
pub use crate::xcx::{WatchEvent, Xcx, XcxOptions};

/// Installs a `tracing` subscriber printing to stderr, filtered by
/// `RUST_LOG` (default `info`), with progress bars drawn above the log.
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init()
}
