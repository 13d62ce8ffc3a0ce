//! Common imports for typical client usage.
//!
//! This module intentionally exports the most frequently used request/stream
//! types so examples and application code need fewer import lines.
pub use crate::{
    AbortHandle, ApiClient, ApiClientBuilder, ApiRequest, ApiResponse, ChatEvent, ChatRequest,
    ChatStream, ClientConfig, MessageMeta, NotificationKind, NotificationSink, ReauthReason,
    RequestError, StreamFailure,
};
