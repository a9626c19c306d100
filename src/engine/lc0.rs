use std::{collections::HashMap, sync::mpsc};

use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;

use super::{Engine, EngineState, EngineType, Lifecycle};
use crate::{
    channel::ResponseSink,
    command::GoParams,
    error::EngineError,
    native::{self, CoreError, Flow, LC0, UciCore},
};

/// Parse and dispatch failures of the Lc0 command loop. These are logged as
/// unsupported commands and never leave the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("unexpected token '{token}' in {command}")]
    UnexpectedToken { command: String, token: String },

    #[error("{command} requires {param}")]
    MissingParam {
        command: String,
        param: &'static str,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// A command split into its name and keyword arguments, e.g.
/// `setoption name Threads value 4` becomes
/// `("setoption", {"name": "Threads", "value": "4"})`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub params: HashMap<String, String>,
}

impl ParsedCommand {
    fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn require(&self, key: &'static str) -> Result<&str, CommandError> {
        self.param(key).ok_or_else(|| CommandError::MissingParam {
            command: self.name.clone(),
            param: key,
        })
    }
}

fn keywords(command: &str) -> Option<&'static [&'static str]> {
    let keys: &'static [&'static str] = match command {
        "uci" | "isready" | "ucinewgame" | "stop" | "ponderhit" | "quit" => &[],
        "setoption" => &["context", "name", "value"],
        "position" => &["fen", "startpos", "moves"],
        "go" => &[
            "infinite",
            "wtime",
            "btime",
            "winc",
            "binc",
            "movestogo",
            "depth",
            "mate",
            "nodes",
            "movetime",
            "searchmoves",
            "ponder",
        ],
        _ => return None,
    };
    Some(keys)
}

/// The long-lived loop object: parses text into [`ParsedCommand`]s and
/// dispatches them against its own engine state, printing through the
/// response callback.
pub struct EngineLoop {
    core: UciCore,
    sink: ResponseSink,
}

impl EngineLoop {
    pub fn new(sink: ResponseSink, threads: usize) -> Self {
        let mut core = UciCore::new(&LC0);
        if let Err(e) = core.set_option("Threads", Some(&threads.to_string())) {
            debug!("keeping default thread count: {e}");
        }
        Self { core, sink }
    }

    pub fn parse_command(line: &str) -> Result<ParsedCommand, CommandError> {
        let mut tokens = line.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| CommandError::Unknown(String::new()))?
            .to_string();
        let keys = keywords(&name).ok_or_else(|| CommandError::Unknown(name.clone()))?;

        let mut params: HashMap<String, String> = HashMap::new();
        let mut current: Option<&str> = None;
        for token in tokens {
            if let Some(key) = keys.iter().find(|k| **k == token) {
                params.entry(key.to_string()).or_default();
                current = Some(key);
                continue;
            }
            let Some(key) = current else {
                return Err(CommandError::UnexpectedToken {
                    command: name,
                    token: token.to_string(),
                });
            };
            let value = params.entry(key.to_string()).or_default();
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(token);
        }

        Ok(ParsedCommand { name, params })
    }

    pub fn dispatch(&mut self, command: &ParsedCommand) -> Result<Flow, CommandError> {
        let out = &mut self.sink;
        match command.name.as_str() {
            "uci" => self.core.uci(out),
            "isready" => self.core.is_ready(out),
            "setoption" => {
                let name = command.require("name")?;
                self.core.set_option(name, command.param("value"))?;
            }
            "ucinewgame" => self.core.new_game(),
            "position" => {
                let fen = command.param("fen");
                if fen.is_none() && command.param("startpos").is_none() {
                    return Err(CommandError::MissingParam {
                        command: command.name.clone(),
                        param: "fen or startpos",
                    });
                }
                let moves = command
                    .param("moves")
                    .map(|m| m.split_whitespace().map(String::from).collect::<Vec<_>>())
                    .unwrap_or_default();
                self.core.set_position(fen, &moves)?;
            }
            "go" => {
                let mut tokens = Vec::new();
                for (key, value) in &command.params {
                    tokens.push(key.as_str());
                    tokens.extend(value.split_whitespace());
                }
                self.core.go(&GoParams::parse(&tokens), out);
            }
            "stop" => self.core.stop(out),
            "ponderhit" => self.core.ponder_hit(out),
            "quit" => {
                self.core.stop(out);
                return Ok(Flow::Quit);
            }
            other => return Err(CommandError::Unknown(other.to_string())),
        }
        Ok(Flow::Continue)
    }
}

/// Lc0 owns its thread: `initialize` builds the loop object and runs it until
/// shutdown, while `send_command` parses text on the caller's side and hands
/// the structured command to the loop.
pub struct Lc0Engine {
    threads: usize,
    sink: ResponseSink,
    lifecycle: Lifecycle,
    commands: Mutex<Option<mpsc::Sender<ParsedCommand>>>,
}

impl Lc0Engine {
    pub fn new(sink: ResponseSink, threads: usize) -> Self {
        Self {
            threads,
            sink,
            lifecycle: Lifecycle::new(),
            commands: Mutex::new(None),
        }
    }

    fn run_loop(&self, mut engine_loop: EngineLoop, commands: mpsc::Receiver<ParsedCommand>) {
        for command in commands {
            match engine_loop.dispatch(&command) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => warn!("lc0: ignoring unsupported command: {e}"),
            }
        }
        debug!("lc0 run loop exited");
        self.lifecycle.stop();
        self.commands.lock().take();
    }
}

impl Engine for Lc0Engine {
    fn engine_type(&self) -> EngineType {
        EngineType::Lc0
    }

    fn initialize(&self) -> Result<(), EngineError> {
        self.lifecycle.begin()?;

        native::tables();
        let engine_loop = EngineLoop::new(self.sink.clone(), self.threads);
        let (tx, rx) = mpsc::channel();
        *self.commands.lock() = Some(tx);
        info!("{} {} initialized", LC0.name, LC0.version);

        if !self.lifecycle.running() {
            self.commands.lock().take();
            return Ok(());
        }
        self.run_loop(engine_loop, rx);
        Ok(())
    }

    fn deinitialize(&self) {
        self.lifecycle.stop();
        self.commands.lock().take();
    }

    fn send_command(&self, command: &str) -> Result<(), EngineError> {
        self.lifecycle.check_accepting()?;

        let parsed = match EngineLoop::parse_command(command) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("lc0: ignoring unsupported command '{command}': {e}");
                return Ok(());
            }
        };

        let commands = self.commands.lock();
        let commands = commands.as_ref().ok_or(EngineError::Stopped)?;
        commands.send(parsed).map_err(|_| EngineError::Stopped)
    }

    fn state(&self) -> watch::Receiver<EngineState> {
        self.lifecycle.subscribe()
    }
}
