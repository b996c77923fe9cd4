//! Acquisition State Machine
//!
//! Tracks a session through handshake, configuration and acquisition, and
//! guarantees the terminal state is entered once.

use std::fmt;
use std::time::{Duration, Instant};

/// Acquisition state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionState {
    /// Created, port not yet used
    Init,
    /// Sending `q` and reading the identification lines
    Handshaking,
    /// Sending parameter commands
    Configuring,
    /// Streaming data lines
    Acquiring,
    /// Aborting a stream after cancellation
    Draining,
    /// Port released; terminal
    Closed,
}

impl AcquisitionState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if the port is in use in this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Handshaking | Self::Configuring | Self::Acquiring | Self::Draining
        )
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Handshaking => "handshaking",
            Self::Configuring => "configuring",
            Self::Acquiring => "acquiring",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State transition event
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Previous state
    pub from: AcquisitionState,
    /// New state
    pub to: AcquisitionState,
    /// Time since the machine was created
    pub at: Duration,
    /// Reason for transition
    pub reason: Option<String>,
}

/// Acquisition state machine
#[derive(Debug)]
pub struct AcquisitionStateMachine {
    state: AcquisitionState,
    history: Vec<StateTransition>,
    started: Instant,
}

impl Default for AcquisitionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionStateMachine {
    /// Create a new state machine in [`AcquisitionState::Init`]
    pub fn new() -> Self {
        Self {
            state: AcquisitionState::Init,
            history: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Get current state
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Get state history
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Time since creation
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Transition to a new state
    pub fn transition(
        &mut self,
        new_state: AcquisitionState,
        reason: Option<&str>,
    ) -> Result<(), String> {
        if !self.is_valid_transition(new_state) {
            return Err(format!(
                "Invalid transition from {} to {}",
                self.state, new_state
            ));
        }

        self.history.push(StateTransition {
            from: self.state,
            to: new_state,
            at: self.started.elapsed(),
            reason: reason.map(String::from),
        });
        tracing::debug!(from = %self.state, to = %new_state, reason, "state transition");
        self.state = new_state;
        Ok(())
    }

    /// Check if transition is valid
    fn is_valid_transition(&self, new_state: AcquisitionState) -> bool {
        use AcquisitionState::*;

        match (self.state, new_state) {
            (Init, Handshaking) => true,
            (Handshaking, Configuring) => true,
            (Configuring, Acquiring) => true,
            (Acquiring, Draining) => true,

            // Every non-terminal state can close: success, failure or cancellation
            (Init | Handshaking | Configuring | Acquiring | Draining, Closed) => true,

            _ => false,
        }
    }
}
