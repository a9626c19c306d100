use tokio::sync::watch;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Initializing,
    Running,
    Stopped,
    Failed(String),
}

impl EngineState {
    /// Setup has finished one way or the other.
    pub fn is_settled(&self) -> bool {
        !matches!(self, EngineState::Created | EngineState::Initializing)
    }
}

/// Lifecycle gate shared by all adapters.
///
/// Transitions only move forward: `Created -> Initializing -> Running ->
/// Stopped`, with `Failed` reachable from setup.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<EngineState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(EngineState::Created);
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> EngineState {
        self.state.borrow().clone()
    }

    /// Enters setup. Only a freshly created adapter may be initialized.
    pub fn begin(&self) -> Result<(), EngineError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match state {
            EngineState::Created => {
                *state = EngineState::Initializing;
                true
            }
            EngineState::Stopped => {
                outcome = Err(EngineError::Stopped);
                false
            }
            _ => {
                outcome = Err(EngineError::AlreadyInitialized);
                false
            }
        });
        outcome
    }

    /// Marks setup complete. Returns `false` when a shutdown raced setup, in
    /// which case the caller must unwind instead of entering its loop.
    pub fn running(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == EngineState::Initializing {
                *state = EngineState::Running;
                true
            } else {
                false
            }
        })
    }

    pub fn fail(&self, reason: impl Into<String>) -> EngineError {
        let reason = reason.into();
        let error = EngineError::Setup(reason.clone());
        self.state.send_if_modified(|state| {
            if matches!(state, EngineState::Created | EngineState::Initializing) {
                *state = EngineState::Failed(reason);
                true
            } else {
                false
            }
        });
        error
    }

    /// Moves to `Stopped` unless setup already failed.
    pub fn stop(&self) {
        self.state.send_if_modified(|state| match state {
            EngineState::Stopped | EngineState::Failed(_) => false,
            _ => {
                *state = EngineState::Stopped;
                true
            }
        });
    }

    /// Whether commands may be submitted right now.
    pub fn check_accepting(&self) -> Result<(), EngineError> {
        match &*self.state.borrow() {
            EngineState::Running => Ok(()),
            EngineState::Stopped => Err(EngineError::Stopped),
            _ => Err(EngineError::NotInitialized),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_happy_path() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.check_accepting(), Err(EngineError::NotInitialized));

        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.current(), EngineState::Initializing);
        assert!(lifecycle.running());
        assert_eq!(lifecycle.check_accepting(), Ok(()));

        lifecycle.stop();
        assert_eq!(lifecycle.check_accepting(), Err(EngineError::Stopped));
    }

    #[test]
    fn rejects_second_initialize() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.begin(), Err(EngineError::AlreadyInitialized));
        lifecycle.stop();
        assert_eq!(lifecycle.begin(), Err(EngineError::Stopped));
    }

    #[test]
    fn stop_during_setup_wins() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        lifecycle.stop();
        assert!(!lifecycle.running());
        assert_eq!(lifecycle.current(), EngineState::Stopped);
    }

    #[test]
    fn failure_is_sticky() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        let error = lifecycle.fail("missing tables");
        assert_eq!(error, EngineError::Setup("missing tables".to_string()));

        lifecycle.stop();
        assert_eq!(
            lifecycle.current(),
            EngineState::Failed("missing tables".to_string())
        );
        assert!(lifecycle.current().is_settled());
    }
}
