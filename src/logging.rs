// src/logging.rs
//! Global tracing subscriber setup.

use crate::config::NodeConfig;

/// Install a compact fmt subscriber at the level `config` asks for.
///
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "subscriber")]
pub fn init(config: &NodeConfig) -> bool {
    use tracing_subscriber::fmt::format;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::FmtSubscriber;

    FmtSubscriber::builder()
        .event_format(format().compact())
        .with_max_level(config.tracing_filter())
        .with_target(config.trace)
        .finish()
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "subscriber"))]
pub fn init(_config: &NodeConfig) -> bool {
    false
}
