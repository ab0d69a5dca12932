use std::time::Instant;

/// Computation engine lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running { started_at: Option<Instant> },
    Stopped,
}

impl EngineState {
    pub fn can_transition_to(&self, target: &EngineState) -> bool {
        use EngineState::*;

        matches!((self, target), (Idle, Running { .. }) | (Running { .. }, Stopped))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running { .. } => "Running",
            Self::Stopped => "Stopped",
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::Idle
    }
}
