use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::engine::EngineType;

/// Contract violations and setup failures reported by an engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine is not initialized")]
    NotInitialized,

    #[error("engine is already initialized")]
    AlreadyInitialized,

    #[error("engine has been deinitialized")]
    Stopped,

    #[error("engine setup failed: {0}")]
    Setup(String),
}

/// Errors surfaced by [`Messenger`](crate::Messenger) session control.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("a {0} session is already running")]
    AlreadyRunning(EngineType),

    #[error("no engine session is running")]
    NotRunning,

    #[error("{engine} failed to start: {source}")]
    StartFailed {
        engine: EngineType,
        #[source]
        source: EngineError,
    },

    #[error("{engine} did not shut down within {timeout:?}")]
    ShutdownTimeout { engine: EngineType, timeout: Duration },

    #[error("{engine} background task failed: {reason}")]
    TaskFailed { engine: EngineType, reason: String },
}

/// Errors while copying engine resource files into place.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("resource {0} not found")]
    Missing(PathBuf),

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no home directory to provision resources into")]
    NoHomeDir,
}

/// Errors from the typed [`EngineClient`](crate::EngineClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Messenger(#[from] MessengerError),

    #[error("engine is not running, call start() first")]
    NotRunning,

    #[error("engine setup did not complete within {0:?}")]
    SetupTimeout(Duration),

    #[error("engine response channel closed during setup")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown engine type '{0}', expected one of stockfish, lc0, arasan")]
    EngineType(String),

    #[error("invalid position string '{0}'")]
    PositionString(String),
}
