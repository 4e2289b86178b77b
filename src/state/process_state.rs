/// Frame loop state machine
///
/// Lifecycle of the capture → detect → rules → scoring loop. Every
/// transition returns the `(old, new)` pair so the caller can publish it.

use std::time::{Duration, Instant};

/// State of the frame loop
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ProcessState {
    #[default]
    Stopped,

    /// Camera opening and model loading
    Starting,

    /// Iterations are being scheduled
    Running { since: Instant },

    /// Cancel requested; the in-flight iteration is finishing
    Stopping,
}

impl ProcessState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Stopping)
    }

    pub fn running_duration(&self) -> Option<Duration> {
        match self {
            ProcessState::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "Stopped",
            ProcessState::Starting => "Starting...",
            ProcessState::Running { .. } => "Running",
            ProcessState::Stopping => "Stopping...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    AlreadyRunning,
    AlreadyStopped,
    /// Starting or stopping is still in progress
    InTransition,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::AlreadyRunning => write!(f, "Frame loop is already running"),
            TransitionError::AlreadyStopped => write!(f, "Frame loop is already stopped"),
            TransitionError::InTransition => {
                write!(f, "Frame loop is starting or stopping")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

pub type Transition = (ProcessState, ProcessState);

#[derive(Debug, Default)]
pub struct ProcessStateMachine {
    state: ProcessState,
}

impl ProcessStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    fn set(&mut self, new: ProcessState) -> Transition {
        let old = self.state;
        self.state = new;
        (old, new)
    }

    /// Stopped -> Starting
    pub fn start(&mut self) -> Result<Transition, TransitionError> {
        match self.state {
            ProcessState::Stopped => Ok(self.set(ProcessState::Starting)),
            ProcessState::Running { .. } => Err(TransitionError::AlreadyRunning),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Starting -> Running
    pub fn mark_running(&mut self) -> Result<Transition, TransitionError> {
        match self.state {
            ProcessState::Starting => Ok(self.set(ProcessState::Running {
                since: Instant::now(),
            })),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Running -> Stopping
    pub fn stop(&mut self) -> Result<Transition, TransitionError> {
        match self.state {
            ProcessState::Running { .. } => Ok(self.set(ProcessState::Stopping)),
            ProcessState::Stopped => Err(TransitionError::AlreadyStopped),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Stopping -> Stopped
    pub fn mark_stopped(&mut self) -> Result<Transition, TransitionError> {
        match self.state {
            ProcessState::Stopping => Ok(self.set(ProcessState::Stopped)),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Straight to Stopped, e.g. when the loop thread exits on an error
    pub fn force_stop(&mut self) -> Transition {
        self.set(ProcessState::Stopped)
    }
}
