mod arasan;
mod lc0;
mod lifecycle;
mod stockfish;

use std::{fmt, path::Path, str::FromStr, sync::Arc};

use serde::Deserialize;
use tokio::sync::watch;

use crate::{
    channel::ResponseSink,
    command::EngineCommand,
    config::Config,
    error::EngineError,
    error::ParseError,
    native::{self, Profile},
};

pub use arasan::{ARASAN_RESOURCES, ArasanEngine, ArasanMode};
pub use lc0::{CommandError, EngineLoop, Lc0Engine, ParsedCommand};
pub use lifecycle::{EngineState, Lifecycle};
pub use stockfish::{StockfishEngine, StockfishMode};

/// Builds the adapter for `engine_type`, wired to write its output into `sink`.
pub fn init_engine(engine_type: EngineType, sink: ResponseSink, config: &Config) -> Arc<dyn Engine> {
    match engine_type {
        EngineType::Stockfish => Arc::new(StockfishEngine::new(
            sink,
            config.stockfish_mode,
            config.threads,
        )),
        EngineType::Lc0 => Arc::new(Lc0Engine::new(sink, config.threads)),
        EngineType::Arasan => Arc::new(ArasanEngine::new(
            sink,
            config.arasan_mode,
            config.resource_dir.clone(),
            config.home_dir(),
            config.arasan_stack_size,
        )),
    }
}

/// The capability every backend adapter provides.
///
/// All three operations are blocking native calls. `initialize` may not return
/// until the engine shuts down (adapters that own their thread), so callers run
/// it on a dedicated blocking context and observe readiness through
/// [`Engine::state`] instead.
pub trait Engine: Send + Sync {
    fn engine_type(&self) -> EngineType;

    /// Performs backend setup. Calling it twice on one instance is rejected.
    fn initialize(&self) -> Result<(), EngineError>;

    /// Releases everything `initialize` acquired and makes any run loop it
    /// started exit. Safe after a failed or partial `initialize`.
    fn deinitialize(&self);

    /// Submits one UCI command. The outcome is only visible through the
    /// response sink.
    fn send_command(&self, command: &str) -> Result<(), EngineError>;

    /// Subscribes to lifecycle transitions of this adapter.
    fn state(&self) -> watch::Receiver<EngineState>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    #[default]
    Stockfish,
    Lc0,
    Arasan,
}

impl EngineType {
    pub const ALL: [EngineType; 3] = [EngineType::Stockfish, EngineType::Lc0, EngineType::Arasan];

    /// The user-readable name of the engine.
    pub fn name(&self) -> &'static str {
        match self {
            EngineType::Stockfish => "Stockfish",
            EngineType::Lc0 => "LeelaChessZero (Lc0)",
            EngineType::Arasan => "Arasan",
        }
    }

    /// Identity and option table of the in-process core.
    pub fn profile(&self) -> &'static Profile {
        match self {
            EngineType::Stockfish => &native::STOCKFISH,
            EngineType::Lc0 => &native::LC0,
            EngineType::Arasan => &native::ARASAN,
        }
    }

    /// Version of the bundled engine core, as reported in `id name`.
    pub fn version(&self) -> &'static str {
        self.profile().version
    }

    /// Engine-specific options to send once the UCI handshake completed.
    pub fn setup_commands(&self, resource_dir: &Path) -> Vec<EngineCommand> {
        match self {
            EngineType::Stockfish => {
                let small = resource_dir.join("nn-baff1ede1f90.nnue");
                let big = resource_dir.join("nn-b1a57edbea57.nnue");
                if small.is_file() && big.is_file() {
                    vec![
                        EngineCommand::SetOption {
                            id: "EvalFile".to_string(),
                            value: Some(big.display().to_string()),
                        },
                        EngineCommand::SetOption {
                            id: "EvalFileSmall".to_string(),
                            value: Some(small.display().to_string()),
                        },
                    ]
                } else {
                    Vec::new()
                }
            }
            EngineType::Lc0 | EngineType::Arasan => Vec::new(),
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stockfish" => Ok(EngineType::Stockfish),
            "lc0" | "leela" => Ok(EngineType::Lc0),
            "arasan" => Ok(EngineType::Arasan),
            _ => Err(ParseError::EngineType(s.to_string())),
        }
    }
}
