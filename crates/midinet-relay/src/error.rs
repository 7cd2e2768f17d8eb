use thiserror::Error;

/// Errors raised while reading and parsing a `pianoconnect.conf`-style
/// configuration file, one matchable variant per failure mode.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: unknown directive '{directive}'")]
    UnknownDirective { line: usize, directive: String },
    #[error("line {line}: directive '{directive}' expects {expected} argument(s), got {got}")]
    WrongArgCount {
        line: usize,
        directive: String,
        expected: &'static str,
        got: usize,
    },
    #[error("line {line}: invalid port number '{value}'")]
    InvalidPort { line: usize, value: String },
    #[error("line {line}: invalid integer '{value}' for '{directive}'")]
    InvalidInteger {
        line: usize,
        directive: String,
        value: String,
    },
    #[error("no connection directive found (need one of udp-local/udp-remote, udp-server, udp-client, tcp-server, tcp-client)")]
    MissingConnection,
}

/// Errors surfaced by the relay engine at runtime, as distinct from
/// configuration parse errors. Modeled as a `thiserror` enum at the crate
/// boundary per the ambient error-handling stack; callers at the binary
/// boundary wrap these in `anyhow::Result` via `anyhow::Context`.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to construct transport: {0}")]
    Transport(#[from] anyhow::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
