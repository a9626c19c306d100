//! One asynchronous UCI interface over three in-process chess engines.
//!
//! Stockfish, Lc0 and Arasan all speak UCI but are entered differently: some
//! expose a callable command executor, others want to own the thread they run
//! on. Each backend is wrapped in an [`Engine`] adapter, and a [`Messenger`]
//! runs one adapter per session, feeding it commands in order and handing its
//! output lines to a [`ResponseHandler`] as they appear.
//!
//! [`EngineClient`] adds the typed [`EngineCommand`] / [`EngineResponse`]
//! layer and the UCI startup handshake on top.

pub mod channel;
pub mod client;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod messenger;
pub mod native;
pub mod provision;
pub mod response;
pub mod util;

pub use channel::{ResponseHandler, ResponseSink};
pub use client::{EngineClient, ResponseStream, StartOptions};
pub use command::{EngineCommand, GoParams, PositionString};
pub use config::Config;
pub use engine::{Engine, EngineState, EngineType};
pub use error::{ClientError, EngineError, MessengerError, ProvisionError};
pub use messenger::{EngineFactory, Messenger};
pub use response::EngineResponse;
