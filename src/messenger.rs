//! The session bridge between callers and one engine adapter.
//!
//! A [`Messenger`] owns at most one adapter at a time. While a session runs,
//! three background contexts exist: the blocking context `initialize` runs on
//! (it may never return for adapters that own their thread), a blocking
//! dispatcher that feeds queued commands to the adapter in order, and an async
//! delivery task that hands every output line to the registered handler.

use std::{sync::Arc, time::Duration};

use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinHandle},
};

use crate::{
    channel::{ResponseHandler, ResponseSink},
    config::Config,
    engine::{self, Engine, EngineState, EngineType},
    error::{EngineError, MessengerError},
};

/// Builds a fresh adapter for each session.
pub type EngineFactory = Arc<dyn Fn(EngineType, ResponseSink) -> Arc<dyn Engine> + Send + Sync>;

type SharedHandler = Arc<RwLock<Option<Arc<dyn ResponseHandler>>>>;

struct Session {
    engine: Arc<dyn Engine>,
    commands: mpsc::UnboundedSender<String>,
    init: JoinHandle<Result<(), EngineError>>,
    dispatcher: JoinHandle<()>,
    delivery: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

pub struct Messenger {
    engine_type: EngineType,
    shutdown_timeout: Duration,
    factory: EngineFactory,
    handler: SharedHandler,
    session: Option<Session>,
}

impl Messenger {
    /// A messenger for `engine_type` with default settings.
    pub fn new(engine_type: EngineType) -> Self {
        Self::with_config(Config {
            engine: engine_type,
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let engine_type = config.engine;
        let shutdown_timeout = config.shutdown_timeout();
        let factory: EngineFactory =
            Arc::new(move |engine_type: EngineType, sink: ResponseSink| {
                engine::init_engine(engine_type, sink, &config)
            });
        Self::with_factory(engine_type, shutdown_timeout, factory)
    }

    /// Uses `factory` instead of the built-in adapters.
    pub fn with_factory(
        engine_type: EngineType,
        shutdown_timeout: Duration,
        factory: EngineFactory,
    ) -> Self {
        Self {
            engine_type,
            shutdown_timeout,
            factory,
            handler: Arc::new(RwLock::new(None)),
            session: None,
        }
    }

    pub fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Registers the handler for engine output, replacing any previous one.
    /// Takes effect from the next delivered line.
    pub fn set_response_handler(&self, handler: impl ResponseHandler + 'static) {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Output arriving without a handler is dropped.
    pub fn clear_response_handler(&self) {
        self.handler.write().take();
    }

    /// Creates the adapter and waits until its setup has either completed or
    /// failed. A failed start leaves no session behind.
    pub async fn start(&mut self) -> Result<(), MessengerError> {
        if self.session.is_some() {
            return Err(MessengerError::AlreadyRunning(self.engine_type));
        }
        let engine_type = self.engine_type;

        // subscribe before the adapter exists so its first line is not lost
        let (sink, lines) = ResponseSink::channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let delivery = tokio::spawn(deliver(lines, Arc::clone(&self.handler), shutdown_rx));

        let engine = (self.factory)(engine_type, sink);
        let mut state = engine.state();
        let mut init = {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || engine.initialize())
        };

        let mut init_result = None;
        let settled = tokio::select! {
            biased;
            settled = state.wait_for(EngineState::is_settled) => settled.ok().map(|s| (*s).clone()),
            joined = &mut init => {
                init_result = Some(flatten(joined));
                None
            }
        };
        let settled = settled.unwrap_or_else(|| state.borrow().clone());

        let outcome = match (settled, &init_result) {
            (_, Some(Err(e))) => Err(e.clone()),
            (EngineState::Running, _) => Ok(()),
            (EngineState::Failed(reason), _) => Err(EngineError::Setup(reason)),
            (other, _) => Err(EngineError::Setup(format!(
                "initialize returned while {other:?}"
            ))),
        };

        if let Err(source) = outcome {
            warn!("{engine_type} failed to start: {source}");
            engine.deinitialize();
            if init_result.is_none()
                && tokio::time::timeout(self.shutdown_timeout, init).await.is_err()
            {
                warn!("{engine_type}: initialize did not return after failed start");
            }
            let _ = shutdown.send(());
            let _ = delivery.await;
            return Err(MessengerError::StartFailed {
                engine: engine_type,
                source,
            });
        }

        let (commands, queue) = mpsc::unbounded_channel();
        let dispatcher = {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || dispatch(engine, queue))
        };

        info!("{engine_type} session started");
        self.session = Some(Session {
            engine,
            commands,
            init,
            dispatcher,
            delivery,
            shutdown,
        });
        Ok(())
    }

    /// Deinitializes the adapter and waits for its background contexts, at
    /// most the configured shutdown timeout. Lines not yet delivered are
    /// discarded.
    pub async fn stop(&mut self) -> Result<(), MessengerError> {
        let Session {
            engine,
            commands,
            init,
            dispatcher,
            delivery,
            shutdown,
        } = self.session.take().ok_or(MessengerError::NotRunning)?;
        let engine_type = self.engine_type;
        let timeout = self.shutdown_timeout;

        drop(commands);
        let teardown = async move {
            tokio::task::spawn_blocking(move || engine.deinitialize()).await?;
            let init_result = init.await?;
            dispatcher.await?;
            Ok::<_, JoinError>(init_result)
        };
        let outcome = tokio::time::timeout(timeout, teardown).await;

        let _ = shutdown.send(());
        if let Err(e) = delivery.await {
            warn!("{engine_type}: response delivery task failed: {e}");
        }

        match outcome {
            Err(_) => Err(MessengerError::ShutdownTimeout {
                engine: engine_type,
                timeout,
            }),
            Ok(Err(e)) => Err(MessengerError::TaskFailed {
                engine: engine_type,
                reason: e.to_string(),
            }),
            Ok(Ok(result)) => {
                if let Err(e) = result {
                    debug!("{engine_type}: initialize returned {e}");
                }
                info!("{engine_type} session stopped");
                Ok(())
            }
        }
    }

    /// Queues one command for the adapter. Never waits for the engine.
    pub fn send_command(&self, command: impl Into<String>) -> Result<(), MessengerError> {
        let session = self.session.as_ref().ok_or(MessengerError::NotRunning)?;
        session
            .commands
            .send(command.into())
            .map_err(|_| MessengerError::NotRunning)
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("{} messenger dropped while running", self.engine_type);
            drop(session.commands);
            let _ = session.shutdown.send(());
            session.engine.deinitialize();
        }
    }
}

fn flatten(joined: Result<Result<(), EngineError>, JoinError>) -> Result<(), EngineError> {
    joined.unwrap_or_else(|e| Err(EngineError::Setup(format!("initialize panicked: {e}"))))
}

/// Drains the command queue into the adapter, in submission order.
fn dispatch(engine: Arc<dyn Engine>, mut queue: mpsc::UnboundedReceiver<String>) {
    let engine_type = engine.engine_type();
    while let Some(command) = queue.blocking_recv() {
        match engine.send_command(&command) {
            Ok(()) => {}
            Err(EngineError::Stopped) => {
                debug!("{engine_type} stopped, dropping queued commands");
                break;
            }
            Err(e) => warn!("{engine_type}: '{command}' not sent: {e}"),
        }
    }
}

async fn deliver(
    mut lines: mpsc::UnboundedReceiver<String>,
    handler: SharedHandler,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let current = handler.read().clone();
        match current {
            Some(handler) => handler.on_response(line).await,
            None => trace!("no response handler, dropping '{line}'"),
        }
    }
}
