use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::watch;

use super::{Engine, EngineState, EngineType, Lifecycle};
use crate::{
    channel::{ResponseSink, SinkWriter},
    error::{EngineError, ProvisionError},
    native::{self, ARASAN, CoreError, Flow, UciCore},
    provision::provision,
};

/// Files Arasan expects to find in the home directory.
pub const ARASAN_RESOURCES: [&str; 3] = ["arasan.nnue", "arasan.rc", "book.bin"];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArasanMode {
    /// `send_command` runs the protocol object on the caller's context.
    #[default]
    Direct,
    /// `initialize` polls for commands on a thread with a raised stack.
    Poll,
}

/// Persistent protocol object: one board, one option table, one output
/// stream for the whole session.
struct Protocol {
    core: UciCore,
    out: SinkWriter,
}

impl Protocol {
    fn new(sink: &ResponseSink, rc_file: Option<&Path>) -> Self {
        let mut core = UciCore::new(&ARASAN);
        if let Some(rc_file) = rc_file {
            load_rc(&mut core, rc_file);
        }
        Self {
            core,
            out: sink.writer(),
        }
    }

    /// Returns `false` once the protocol wants to terminate.
    fn do_command(&mut self, command: &str) -> bool {
        match self.core.execute(command, &mut self.out) {
            Ok(Flow::Continue) => true,
            Ok(Flow::Quit) => false,
            Err(CoreError::Unsupported(cmd)) => {
                warn!("arasan: unrecognized command '{cmd}'");
                true
            }
            Err(e) => {
                debug!("arasan: {e}");
                true
            }
        }
    }
}

/// Applies `name=value` lines of an `arasan.rc` file as option defaults.
fn load_rc(core: &mut UciCore, rc_file: &Path) {
    let contents = match fs::read_to_string(rc_file) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("no options read from {}: {e}", rc_file.display());
            return;
        }
    };

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            debug!("arasan.rc: skipping '{line}'");
            continue;
        };
        if let Err(e) = core.set_option(name.trim(), Some(value.trim())) {
            debug!("arasan.rc: {e}");
        }
    }
}

pub struct ArasanEngine {
    mode: ArasanMode,
    sink: ResponseSink,
    resource_dir: PathBuf,
    home_dir: Option<PathBuf>,
    stack_size: usize,
    lifecycle: Lifecycle,
    protocol: Mutex<Option<Protocol>>,
    commands: Mutex<Option<mpsc::Sender<String>>>,
    polling_terminated: AtomicBool,
}

impl ArasanEngine {
    pub fn new(
        sink: ResponseSink,
        mode: ArasanMode,
        resource_dir: PathBuf,
        home_dir: Option<PathBuf>,
        stack_size: usize,
    ) -> Self {
        Self {
            mode,
            sink,
            resource_dir,
            home_dir,
            stack_size,
            lifecycle: Lifecycle::new(),
            protocol: Mutex::new(None),
            commands: Mutex::new(None),
            polling_terminated: AtomicBool::new(false),
        }
    }

    /// Copies the bundled resources into the home directory. Failures only
    /// cost the engine its defaults, so they are logged and setup goes on.
    fn provision_resources(&self) -> Option<PathBuf> {
        match provision(&self.resource_dir, self.home_dir.as_deref(), &ARASAN_RESOURCES) {
            Ok(copied) => {
                debug!("arasan: provisioned {} resource file(s)", copied.len());
                self.home_dir.as_ref().map(|home| home.join("arasan.rc"))
            }
            Err(ProvisionError::NoHomeDir) => {
                warn!("arasan: no home directory, running without resource files");
                None
            }
            Err(e) => {
                error!("arasan: resource provisioning failed: {e}");
                None
            }
        }
    }

    /// Legacy polling loop; returns on `quit`, on deinitialize, or when the
    /// command queue is closed.
    fn poll(&self, mut protocol: Protocol, commands: mpsc::Receiver<String>) {
        while !self.polling_terminated.load(Ordering::Acquire) {
            match commands.recv_timeout(POLL_INTERVAL) {
                Ok(command) => {
                    if !protocol.do_command(&command) {
                        debug!("arasan: protocol terminated");
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.lifecycle.stop();
        self.commands.lock().take();
    }

    fn run_polling(&self, protocol: Protocol, commands: mpsc::Receiver<String>) {
        let work = Mutex::new(Some((protocol, commands)));
        let run = || {
            if let Some((protocol, commands)) = work.lock().take() {
                self.poll(protocol, commands);
            }
        };

        thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name("arasan-poll".to_string())
                .stack_size(self.stack_size)
                .spawn_scoped(scope, run);
            match spawned {
                Ok(handle) => {
                    if handle.join().is_err() {
                        error!("arasan: polling thread panicked");
                        self.lifecycle.stop();
                    }
                }
                Err(e) => {
                    warn!("arasan: could not spawn polling thread ({e}), polling inline");
                    run();
                }
            }
        });
    }
}

impl Engine for ArasanEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::Arasan
    }

    fn initialize(&self) -> Result<(), EngineError> {
        self.lifecycle.begin()?;

        let rc_file = self.provision_resources();
        native::tables();
        let protocol = Protocol::new(&self.sink, rc_file.as_deref());
        info!(
            "{} {} by {} initialized ({:?})",
            ARASAN.name, ARASAN.version, ARASAN.author, self.mode
        );

        match self.mode {
            ArasanMode::Direct => {
                *self.protocol.lock() = Some(protocol);
                if !self.lifecycle.running() {
                    self.protocol.lock().take();
                }
                Ok(())
            }
            ArasanMode::Poll => {
                let (tx, rx) = mpsc::channel();
                *self.commands.lock() = Some(tx);
                if !self.lifecycle.running() {
                    self.commands.lock().take();
                    return Ok(());
                }
                self.run_polling(protocol, rx);
                Ok(())
            }
        }
    }

    fn deinitialize(&self) {
        self.lifecycle.stop();
        self.polling_terminated.store(true, Ordering::Release);
        self.commands.lock().take();
        self.protocol.lock().take();
    }

    fn send_command(&self, command: &str) -> Result<(), EngineError> {
        self.lifecycle.check_accepting()?;

        match self.mode {
            ArasanMode::Direct => {
                let mut protocol = self.protocol.lock();
                let protocol = protocol.as_mut().ok_or(EngineError::Stopped)?;
                if !protocol.do_command(command) {
                    debug!("arasan: quit received, awaiting deinitialize");
                }
                Ok(())
            }
            ArasanMode::Poll => {
                let commands = self.commands.lock();
                let commands = commands.as_ref().ok_or(EngineError::Stopped)?;
                commands
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
    use std::sync::Arc;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "uci-messenger-arasan-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn direct_mode_provisions_and_reads_rc() {
        let resources = scratch("resources");
        let home = scratch("home");
        fs::write(resources.join("arasan.rc"), "# defaults\nHash=256\nBogus=1\n").unwrap();
        fs::write(resources.join("book.bin"), b"book").unwrap();
        fs::write(home.join("book.bin"), b"old book contents").unwrap();

        let (sink, mut rx) = ResponseSink::channel();
        let engine = ArasanEngine::new(
            sink,
            ArasanMode::Direct,
            resources,
            Some(home.clone()),
            1 << 20,
        );
        engine.initialize().unwrap();

        assert_eq!(fs::read(home.join("book.bin")).unwrap(), b"book");
        assert!(!home.join("arasan.nnue").exists());
        {
            let protocol = engine.protocol.lock();
            assert_eq!(protocol.as_ref().unwrap().core.option("Hash"), Some("256"));
        }

        engine.send_command("frobnicate").unwrap();
        engine.send_command("isready").unwrap();
        assert_eq!(rx.blocking_recv().as_deref(), Some("readyok"));

        engine.deinitialize();
        assert_eq!(engine.send_command("isready"), Err(EngineError::Stopped));
    }

    #[test]
    fn starts_without_home_dir() {
        let (sink, _rx) = ResponseSink::channel();
        let engine = ArasanEngine::new(
            sink,
            ArasanMode::Direct,
            PathBuf::from("does-not-exist"),
            None,
            1 << 20,
        );
        assert_eq!(engine.initialize(), Ok(()));
        assert_eq!(*engine.state().borrow(), EngineState::Running);
    }

    #[test]
    fn poll_mode_runs_until_deinitialized() {
        let (sink, mut rx) = ResponseSink::channel();
        let engine = Arc::new(ArasanEngine::new(
            sink,
            ArasanMode::Poll,
            PathBuf::from("does-not-exist"),
            None,
            4 << 20,
        ));
        let mut state = engine.state();

        let runner = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.initialize())
        };
        while *state.borrow_and_update() != EngineState::Running {
            thread::sleep(Duration::from_millis(5));
        }

        engine.send_command("uci").unwrap();
        assert_eq!(rx.blocking_recv().as_deref(), Some("id name Arasan 24.0"));

        engine.deinitialize();
        assert_eq!(runner.join().unwrap(), Ok(()));
        assert_eq!(*state.borrow(), EngineState::Stopped);
    }
}
