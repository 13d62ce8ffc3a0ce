//! Async client for a chat backend with an incrementally streamed answer
//! protocol.
//!
//! Non-streaming requests go through [`ApiClient::send`] (raced against a
//! fixed timeout); streaming chat sessions go through [`ApiClient::stream`],
//! which hands back a [`ChatStream`] of typed events plus an [`AbortHandle`]
//! that is valid before the first byte arrives.
//!
//! # Streaming usage
//!
//! ```no_run
//! use chatkit_client::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), RequestError> {
//! let client = ApiClient::new(ClientConfig::new(
//!     "https://console.example.com/api",
//!     "https://app.example.com/api",
//! ))?;
//!
//! let mut stream = client.stream(ChatRequest::new(
//!     "/chat-messages",
//!     json!({"query": "Say hello", "response_mode": "streaming"}),
//! ));
//!
//! while let Some(event) = stream.next_event().await {
//!     match event {
//!         ChatEvent::Delta { text, .. } => print!("{text}"),
//!         ChatEvent::Completed => println!(),
//!         ChatEvent::Failed(failure) => eprintln!("stream failed: {failure}"),
//!         ChatEvent::Thought(_) | ChatEvent::MessageEnd(_) => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Credential store collaborator and shared-token helpers.
pub mod auth;
/// Injected client configuration (base URLs, timeout, shared token).
pub mod config;
/// Error taxonomy for transport calls and streaming sessions.
pub mod errors;
/// Public streaming session events.
pub mod events;
/// User-facing notification collaborator.
pub mod notify;
/// Common imports for typical usage.
pub mod prelude;
/// Transport primitive: request descriptors, the client, and CRUD helpers.
pub mod request;
mod sse;
/// Streaming session controller and cancellation handle.
pub mod stream;
/// Streamed upload sub-interface.
pub mod upload;

pub use auth::{CredentialStore, NoCredentials, shared_token_from_path};
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use errors::{ReauthReason, RequestError, StreamFailure};
pub use events::{ChatEvent, MessageMeta};
pub use notify::{NotificationKind, NotificationSink, TracingSink};
pub use request::{ApiClient, ApiClientBuilder, ApiRequest, ApiResponse, ResponseMode};
pub use sse::decode_unicode_escapes;
pub use stream::{AbortHandle, ChatRequest, ChatStream};
pub use upload::{ProgressFn, UploadRequest};
