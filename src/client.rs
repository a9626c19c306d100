use std::{
    path::PathBuf,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    thread,
    time::Duration,
};

use futures::Stream;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::{
    command::EngineCommand,
    config::Config,
    engine::EngineType,
    error::{ClientError, MessengerError},
    messenger::Messenger,
    response::EngineResponse,
};

#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Cores the engine may use; one is left free. Defaults to all cores.
    pub core_count: Option<usize>,
    pub multipv: u32,
    pub setup_timeout: Duration,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            core_count: None,
            multipv: 1,
            setup_timeout: Duration::from_secs(10),
        }
    }
}

/// Next command of the startup handshake:
/// `uci` → `uciok` → `isready` → `readyok`.
pub fn next_setup_command(response: Option<&EngineResponse>) -> Option<EngineCommand> {
    match response {
        None => Some(EngineCommand::Uci),
        Some(EngineResponse::UciOk) => Some(EngineCommand::IsReady),
        _ => None,
    }
}

/// Parsed engine output, in emission order.
pub struct ResponseStream {
    rx: mpsc::UnboundedReceiver<EngineResponse>,
}

impl Stream for ResponseStream {
    type Item = EngineResponse;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Typed UCI client on top of a [`Messenger`].
///
/// `start` resolves only after the handshake and the initial option setup,
/// after which [`EngineClient::responses`] yields everything the engine says.
pub struct EngineClient {
    engine_type: EngineType,
    resource_dir: PathBuf,
    messenger: Messenger,
    running: bool,
    logging: Arc<AtomicBool>,
    responses: Option<mpsc::UnboundedReceiver<EngineResponse>>,
}

impl EngineClient {
    pub fn new(engine_type: EngineType) -> Self {
        Self::with_config(Config {
            engine: engine_type,
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            engine_type: config.engine,
            resource_dir: config.resource_dir.clone(),
            messenger: Messenger::with_config(config),
            running: false,
            logging: Arc::new(AtomicBool::new(false)),
            responses: None,
        }
    }

    pub fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Logs every command and response at info level.
    pub fn set_logging(&self, enabled: bool) {
        self.logging.store(enabled, Ordering::Relaxed);
    }

    /// Starts a session. A running session is left untouched and reported as
    /// [`MessengerError::AlreadyRunning`].
    pub async fn start(&mut self, options: StartOptions) -> Result<(), ClientError> {
        if self.running || self.messenger.is_running() {
            return Err(MessengerError::AlreadyRunning(self.engine_type).into());
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        let logging = Arc::clone(&self.logging);
        let engine_type = self.engine_type;
        self.messenger.set_response_handler(move |line: String| {
            let log_it = logging.load(Ordering::Relaxed);
            match EngineResponse::parse(&line) {
                Some(response) => {
                    if log_it {
                        info!("{engine_type} < {response}");
                    }
                    let _ = tx.send(response);
                }
                None if log_it && !line.trim().is_empty() => info!("{engine_type} < {line}"),
                None => {}
            }
        });

        self.messenger.start().await?;

        match tokio::time::timeout(options.setup_timeout, self.handshake(&mut rx)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.abort_start().await;
                return Err(e);
            }
            Err(_) => {
                self.abort_start().await;
                return Err(ClientError::SetupTimeout(options.setup_timeout));
            }
        }

        self.running = true;
        self.initial_setup(&options)?;
        self.responses = Some(rx);
        Ok(())
    }

    async fn handshake(
        &self,
        rx: &mut mpsc::UnboundedReceiver<EngineResponse>,
    ) -> Result<(), ClientError> {
        if let Some(command) = next_setup_command(None) {
            self.dispatch(&command)?;
        }
        while let Some(response) = rx.recv().await {
            if response == EngineResponse::ReadyOk {
                return Ok(());
            }
            match next_setup_command(Some(&response)) {
                Some(command) => self.dispatch(&command)?,
                None => debug!("{} setup: {response}", self.engine_type),
            }
        }
        Err(ClientError::ChannelClosed)
    }

    async fn abort_start(&mut self) {
        self.messenger.clear_response_handler();
        if let Err(e) = self.messenger.stop().await {
            warn!("{}: stopping after failed setup: {e}", self.engine_type);
        }
    }

    fn initial_setup(&self, options: &StartOptions) -> Result<(), ClientError> {
        for command in self.engine_type.setup_commands(&self.resource_dir) {
            self.send(command)?;
        }

        let cores = options
            .core_count
            .or_else(|| thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1);
        self.send(EngineCommand::SetOption {
            id: "Threads".to_string(),
            value: Some(cores.saturating_sub(1).max(1).to_string()),
        })?;
        self.send(EngineCommand::SetOption {
            id: "MultiPV".to_string(),
            value: Some(options.multipv.to_string()),
        })
    }

    /// The response stream of the current session. Can be taken once per
    /// session; it ends when the session is stopped.
    pub fn responses(&mut self) -> Option<ResponseStream> {
        self.responses.take().map(|rx| ResponseStream { rx })
    }

    /// Sends `command`. Until `start` has completed only the handshake
    /// commands are accepted.
    pub fn send(&self, command: EngineCommand) -> Result<(), ClientError> {
        if !self.running && !command.is_handshake() {
            debug!("engine is not running, call start() first");
            return Err(ClientError::NotRunning);
        }
        self.dispatch(&command)
    }

    fn dispatch(&self, command: &EngineCommand) -> Result<(), ClientError> {
        let line = command.to_string();
        if self.logging.load(Ordering::Relaxed) {
            info!("{} > {line}", self.engine_type);
        }
        Ok(self.messenger.send_command(line)?)
    }

    /// Halts any search, quits the engine and ends the session.
    pub async fn stop(&mut self) -> Result<(), ClientError> {
        if !self.running {
            return Ok(());
        }
        for command in [EngineCommand::Stop, EngineCommand::Quit] {
            if let Err(e) = self.send(command) {
                debug!("{}: {e}", self.engine_type);
            }
        }
        self.running = false;
        self.responses = None;

        self.messenger.clear_response_handler();
        self.messenger.stop().await?;
        Ok(())
    }
}
