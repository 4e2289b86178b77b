/// Event types broadcast by the scoring engine and the frame loop
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::ProcessState;

/// Kind of discrete score notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateKind {
    Runs,
    Wicket,
    OverComplete,
    InningsChange,
    MatchEnd,
}

/// Discrete notification fired after the matching store write completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub kind: UpdateKind,
    pub match_id: String,
    pub innings: u8,
    pub over: u32,
    pub ball: u32,
    /// Runs added by the delivery, zero for non-run updates
    pub runs: u32,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Frame loop lifecycle and outcome events
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged {
        old_state: ProcessState,
        new_state: ProcessState,
    },

    /// The rule engine emitted an event and it was scored
    EventScored { description: String, confidence: f32 },

    /// An iteration failed; transient failures are retried on the next tick
    IterationFailed { message: String, transient: bool },
}

impl PipelineEvent {
    pub fn description(&self) -> String {
        match self {
            PipelineEvent::StateChanged { new_state, .. } => {
                format!("Frame loop: {}", new_state.description())
            }
            PipelineEvent::EventScored {
                description,
                confidence,
            } => format!("{} ({:.0}%)", description, confidence * 100.0),
            PipelineEvent::IterationFailed { message, transient } => {
                if *transient {
                    format!("Retrying: {}", message)
                } else {
                    format!("Stopped: {}", message)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&UpdateKind::OverComplete).unwrap(),
            "\"OVER_COMPLETE\""
        );
        assert_eq!(serde_json::to_string(&UpdateKind::MatchEnd).unwrap(), "\"MATCH_END\"");
    }

    #[test]
    fn test_pipeline_event_description() {
        let event = PipelineEvent::EventScored {
            description: "SIX! Cleared the rope".to_string(),
            confidence: 0.85,
        };
        assert_eq!(event.description(), "SIX! Cleared the rope (85%)");

        let event = PipelineEvent::StateChanged {
            old_state: ProcessState::Starting,
            new_state: ProcessState::Stopped,
        };
        assert_eq!(event.description(), "Frame loop: Stopped");
    }
}
