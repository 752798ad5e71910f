//! Finite State Machine for a publish attempt

use serde::{Deserialize, Serialize};

/// Deploy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    /// Ready for a new attempt
    Idle,

    /// Capturing the kernel environment
    InspectingEnvironment,

    /// Deploy request in flight
    Submitting,

    /// Waiting for the server-side task to finish
    Polling,

    /// Resolving the published content's URL and recording it
    Finalizing,

    /// Deploy completed
    Succeeded,

    /// Deploy failed
    Failed,
}

impl DeployState {
    /// Whether an attempt is under way
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            DeployState::InspectingEnvironment
                | DeployState::Submitting
                | DeployState::Polling
                | DeployState::Finalizing
        )
    }
}

/// Deploy event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Start capturing the environment
    Inspect,

    /// Send the deploy request
    Submit,

    /// Server accepted the request and started a task
    Submitted,

    /// Task finished with code 0
    TaskSucceeded,

    /// Content URL resolved and recorded
    Finalized,

    /// Any step failed
    Fail(String),

    /// Back to idle
    Reset,
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    state: DeployState,
    error: Option<String>,
    attempts: u32,
    history: Vec<DeployState>,
}

impl DeployFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: DeployState::Idle,
            error: None,
            attempts: 0,
            history: vec![DeployState::Idle],
        }
    }

    /// Get current state
    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Error of the last failed attempt
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of attempts started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Every state entered, oldest first
    pub fn history(&self) -> &[DeployState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            // From Idle
            (DeployState::Idle, DeployEvent::Inspect) => {
                self.begin_attempt();
                DeployState::InspectingEnvironment
            }
            (DeployState::Idle, DeployEvent::Submit) => {
                self.begin_attempt();
                DeployState::Submitting
            }

            // From InspectingEnvironment
            (DeployState::InspectingEnvironment, DeployEvent::Submit) => DeployState::Submitting,
            // target needs a user choice before submitting
            (DeployState::InspectingEnvironment, DeployEvent::Reset) => DeployState::Idle,

            // From Submitting
            (DeployState::Submitting, DeployEvent::Submitted) => DeployState::Polling,

            // From Polling
            (DeployState::Polling, DeployEvent::TaskSucceeded) => DeployState::Finalizing,

            // From Finalizing
            (DeployState::Finalizing, DeployEvent::Finalized) => DeployState::Succeeded,

            // Failures
            (state, DeployEvent::Fail(err)) if state.is_busy() => {
                self.error = Some(err.clone());
                DeployState::Failed
            }

            // From terminal states
            (DeployState::Succeeded | DeployState::Failed, DeployEvent::Reset) => DeployState::Idle,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(())
    }

    fn begin_attempt(&mut self) {
        self.error = None;
        self.attempts += 1;
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
