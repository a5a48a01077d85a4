use thiserror::Error;

/// Crate-wide error type.
///
/// Variants map directly onto the failure taxonomy in SPEC_FULL.md §7.
/// Predicate-compile and config errors are synchronous and returned to the
/// caller; upstream connect/protocol errors are fatal and drive process exit
/// from the call site that detects them (see `source::Source`).
#[derive(Error, Debug)]
pub enum ViewstreamError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("upstream connect error: {0}")]
    UpstreamConnect(String),

    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("predicate compile error: {0}")]
    PredicateCompile(String),

    #[error("duplicate trigger name: {0}")]
    DuplicateTrigger(String),

    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),

    #[error("unknown view: {0}")]
    UnknownView(String),

    #[error("view registry is shutting down")]
    RegistryShuttingDown,

    #[error("source disposed")]
    SourceDisposed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ViewstreamError>;
