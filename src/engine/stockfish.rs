use std::sync::mpsc;

use log::{debug, info};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::watch;

use super::{Engine, EngineState, EngineType, Lifecycle};
use crate::{
    channel::{Output, ResponseSink, SinkWriter},
    error::EngineError,
    native::{self, Flow, STOCKFISH, UciCore},
};

/// How commands reach the Stockfish core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockfishMode {
    /// `send_command` calls straight into the UCI executor.
    #[default]
    Decomposed,
    /// `initialize` runs the engine's own read loop, commands are written to
    /// the input stream that loop reads.
    Monolithic,
}

struct Uci {
    core: UciCore,
    out: SinkWriter,
}

impl Uci {
    fn new(sink: &ResponseSink, threads: usize) -> Self {
        let mut core = UciCore::new(&STOCKFISH);
        if let Err(e) = core.set_option("Threads", Some(&threads.to_string())) {
            debug!("keeping default thread count: {e}");
        }
        Self {
            core,
            out: sink.writer(),
        }
    }

    /// `UCI::execute_command`. Errors are printed the way Stockfish prints
    /// them, they never reach the caller.
    fn execute(&mut self, command: &str) -> Flow {
        match self.core.execute(command, &mut self.out) {
            Ok(flow) => flow,
            Err(e) => {
                self.out.emit(&e.to_string());
                Flow::Continue
            }
        }
    }
}

pub struct StockfishEngine {
    mode: StockfishMode,
    threads: usize,
    sink: ResponseSink,
    lifecycle: Lifecycle,
    uci: Mutex<Option<Uci>>,
    stdin: Mutex<Option<mpsc::Sender<String>>>,
}

impl StockfishEngine {
    pub fn new(sink: ResponseSink, mode: StockfishMode, threads: usize) -> Self {
        Self {
            mode,
            threads,
            sink,
            lifecycle: Lifecycle::new(),
            uci: Mutex::new(None),
            stdin: Mutex::new(None),
        }
    }

    /// The read loop of the monolithic entry point; returns on `quit` or when
    /// the input stream is closed.
    fn main_loop(&self, stdin: mpsc::Receiver<String>, mut uci: Uci) {
        for command in stdin {
            if uci.execute(&command) == Flow::Quit {
                debug!("stockfish main loop received quit");
                break;
            }
        }
        self.lifecycle.stop();
        self.stdin.lock().take();
    }
}

impl Engine for StockfishEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Stockfish
    }

    fn initialize(&self) -> Result<(), EngineError> {
        self.lifecycle.begin()?;

        native::tables();
        let uci = Uci::new(&self.sink, self.threads);
        info!("{} {} initialized ({:?})", STOCKFISH.name, STOCKFISH.version, self.mode);

        match self.mode {
            StockfishMode::Decomposed => {
                *self.uci.lock() = Some(uci);
                if !self.lifecycle.running() {
                    self.uci.lock().take();
                }
                Ok(())
            }
            StockfishMode::Monolithic => {
                let (tx, rx) = mpsc::channel();
                *self.stdin.lock() = Some(tx);
                if !self.lifecycle.running() {
                    self.stdin.lock().take();
                    return Ok(());
                }
                self.main_loop(rx, uci);
                Ok(())
            }
        }
    }

    fn deinitialize(&self) {
        self.lifecycle.stop();
        // closing stdin ends the main loop, dropping the core frees the threads
        self.stdin.lock().take();
        self.uci.lock().take();
    }

    fn send_command(&self, command: &str) -> Result<(), EngineError> {
        self.lifecycle.check_accepting()?;

        match self.mode {
            StockfishMode::Decomposed => {
                let mut uci = self.uci.lock();
                let uci = uci.as_mut().ok_or(EngineError::Stopped)?;
                uci.execute(command);
                Ok(())
            }
            StockfishMode::Monolithic => {
                let stdin = self.stdin.lock();
                let stdin = stdin.as_ref().ok_or(EngineError::Stopped)?;
                stdin
                    .send(command.to_string())
                    .map_err(|_| EngineError::Stopped)
            }
        }
    }

    fn state(&self) -> watch::Receiver<EngineState> {
        self.lifecycle.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    fn recv_until(rx: &mut UnboundedReceiver<String>, wanted: &str) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = rx.blocking_recv() {
            let done = line == wanted;
            lines.push(line);
            if done {
                break;
            }
        }
        lines
    }

    #[test]
    fn decomposed_answers_directly() {
        let (sink, mut rx) = ResponseSink::channel();
        let engine = StockfishEngine::new(sink, StockfishMode::Decomposed, 2);

        assert_eq!(engine.send_command("uci"), Err(EngineError::NotInitialized));
        engine.initialize().unwrap();
        assert_eq!(engine.initialize(), Err(EngineError::AlreadyInitialized));

        engine.send_command("uci").unwrap();
        let lines = recv_until(&mut rx, "uciok");
        assert_eq!(lines[0], "id name Stockfish 16.1");

        engine.send_command("flip").unwrap();
        assert_eq!(
            rx.blocking_recv().as_deref(),
            Some("Unknown command: 'flip'. Type help for more information.")
        );

        engine.deinitialize();
        assert_eq!(engine.send_command("isready"), Err(EngineError::Stopped));
    }

    #[test]
    fn applies_thread_count() {
        let (sink, _rx) = ResponseSink::channel();
        let engine = StockfishEngine::new(sink, StockfishMode::Decomposed, 3);
        engine.initialize().unwrap();
        let uci = engine.uci.lock();
        assert_eq!(uci.as_ref().unwrap().core.option("Threads"), Some("3"));
    }

    #[test]
    fn monolithic_loop_reads_stdin_until_deinitialized() {
        let (sink, mut rx) = ResponseSink::channel();
        let engine = Arc::new(StockfishEngine::new(sink, StockfishMode::Monolithic, 1));
        let mut state = engine.state();

        let runner = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.initialize())
        };
        while *state.borrow_and_update() != EngineState::Running {
            thread::sleep(Duration::from_millis(5));
        }

        engine.send_command("isready").unwrap();
        assert_eq!(rx.blocking_recv().as_deref(), Some("readyok"));

        engine.deinitialize();
        assert_eq!(runner.join().unwrap(), Ok(()));
        assert_eq!(engine.send_command("isready"), Err(EngineError::Stopped));
    }

    #[test]
    fn monolithic_quit_ends_the_loop() {
        let (sink, _rx) = ResponseSink::channel();
        let engine = Arc::new(StockfishEngine::new(sink, StockfishMode::Monolithic, 1));
        let mut state = engine.state();

        let runner = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.initialize())
        };
        while *state.borrow_and_update() != EngineState::Running {
            thread::sleep(Duration::from_millis(5));
        }

        engine.send_command("quit").unwrap();
        assert_eq!(runner.join().unwrap(), Ok(()));
        assert_eq!(*state.borrow(), EngineState::Stopped);
    }
}
