use serde_json::Value;

use crate::errors::StreamFailure;

/// Identifying fields carried by answer deltas.
///
/// On a recovered parse failure these are back-filled from the last
/// successfully parsed event so the consumer can still attribute the delta.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageMeta {
    pub conversation_id: Option<String>,
    pub task_id: Option<String>,
    pub message_id: Option<String>,
}

/// One event of a streaming chat session, in stream order.
///
/// Exactly one terminal event (`Completed` or `Failed`) is delivered per
/// session, and it is always the last event.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// Incremental answer text, after the unicode-escape pass.
    ///
    /// `is_first` is true for the first delta of the session only and never
    /// resets. Recovered parse failures surface as an empty-text delta.
    Delta {
        text: String,
        is_first: bool,
        meta: MessageMeta,
    },
    /// Structured agent thought, verbatim from the wire.
    Thought(Value),
    /// Completion metadata, verbatim from the wire.
    MessageEnd(Value),
    /// Terminal failure outcome.
    Failed(StreamFailure),
    /// Terminal success outcome.
    Completed,
}

impl ChatEvent {
    /// True for the two terminal variants.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Completed)
    }
}
