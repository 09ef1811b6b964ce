//! Tracing setup for binaries and tests embedding the pipeline
//!
//! Filter comes from `RUST_LOG`, defaulting to `info`.

use crate::error::{PipelineError, PipelineResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber, plain or JSON lines.
///
/// # Errors
/// [`PipelineError::Config`] when a global subscriber is already set.
pub fn init(json: bool) -> PipelineResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| PipelineError::Config(format!("tracing subscriber: {e}")))
}
