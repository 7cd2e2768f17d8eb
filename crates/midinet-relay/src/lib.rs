/// The relay engine: configuration, wire-level clock sync, message dedup,
/// the playback queue, and the session log, wired together by [`relay::run`].
pub mod clocksync;
pub mod config;
pub mod error;
pub mod ingress;
pub mod queue;
pub mod received;
pub mod relay;
pub mod scheduler;
pub mod sessionlog;
pub mod state;

pub use config::Configuration;
pub use error::{ConfigError, RelayError};
pub use relay::run;
