use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt as _;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;
use uuid::Uuid;

use crate::errors::StreamFailure;
use crate::events::ChatEvent;
use crate::notify::{NotificationKind, NotificationSink};
use crate::request::{ApiClient, CONTENT_TYPE_JSON, CONTENT_TYPE_STREAM};
use crate::sse::{StreamDecoder, WireEvent, decode_unicode_escapes};

const STREAM_BUFFER_CAPACITY: usize = 128;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, BoxError>> + Send>>;

/// Handle used to request cancellation of an in-flight streaming session.
///
/// Cancellation surfaces as a terminal [`ChatEvent::Failed`] with
/// [`StreamFailure::Cancelled`]; it is never forwarded to the notification
/// sink.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Descriptor for one streaming chat request.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    path: String,
    body: Value,
    headers: Vec<(String, String)>,
    public: bool,
}

impl ChatRequest {
    /// Creates a streaming POST to `path` with a JSON body.
    pub fn new(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
            headers: Vec::new(),
            public: false,
        }
    }

    /// Adds a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Targets the public base URL and attaches a bearer credential.
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

/// Streaming session handle returned by [`ApiClient::stream`].
///
/// Consume events with [`next_event`](Self::next_event); exactly one terminal
/// event arrives per session and it is always the last one.
pub struct ChatStream {
    request_id: Uuid,
    rx: mpsc::Receiver<ChatEvent>,
    final_rx: oneshot::Receiver<Result<String, StreamFailure>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl ChatStream {
    /// Returns the id used in logs for this session.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns a handle that can cancel the session.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next event.
    ///
    /// Returns `None` after the channel closes.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        let event = self.rx.recv().await;
        if matches!(&event, Some(event) if event.is_terminal()) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the concatenated answer text.
    ///
    /// Safe to call after consuming events manually with `next_event`.
    pub async fn finish(mut self) -> Result<String, StreamFailure> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }
        match self.final_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(StreamFailure::decode(
                "session task ended without an outcome",
            )),
        }
    }
}

impl ApiClient {
    /// Starts one streaming chat session.
    ///
    /// The handle (and its abort handle) is returned before the network call
    /// begins, so the session can be cancelled at any point — before the
    /// response arrives or mid-stream. Streaming sessions are not raced
    /// against the configured timeout; they are bounded by cancellation.
    pub fn stream(&self, request: ChatRequest) -> ChatStream {
        let request_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER_CAPACITY);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let abort_handle = AbortHandle { tx: abort_tx };

        let url = self.config.url_for(request.public, &request.path);
        let mut builder = self
            .http
            .post(&url)
            .header("Content-Type", CONTENT_TYPE_JSON)
            .header("Accept", CONTENT_TYPE_STREAM)
            .json(&request.body);
        if request.public {
            builder = builder.bearer_auth(self.bearer_for_public());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let notifier = self.notifier.clone();
        tokio::spawn(session_task(
            builder, notifier, request_id, tx, final_tx, abort_rx,
        ));

        ChatStream {
            request_id,
            rx,
            final_rx,
            abort_handle,
            saw_terminal: false,
        }
    }
}

async fn session_task(
    builder: reqwest::RequestBuilder,
    notifier: Arc<dyn NotificationSink>,
    request_id: Uuid,
    tx: mpsc::Sender<ChatEvent>,
    final_tx: oneshot::Sender<Result<String, StreamFailure>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    debug!(%request_id, "starting chat stream");

    let response = tokio::select! {
        _ = aborted(&mut abort_rx) => {
            send_terminal(&tx, final_tx, Err(StreamFailure::Cancelled), notifier.as_ref()).await;
            return;
        }
        sent = builder.send() => match sent {
            Ok(response) => response,
            Err(e) => {
                let failure = StreamFailure::transport(format!("request failed: {e}"));
                send_terminal(&tx, final_tx, Err(failure), notifier.as_ref()).await;
                return;
            }
        },
    };

    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
        // Short-circuit: one notification, one terminal event, no decode.
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("message")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_else(|| "Server Error".to_string());
        let failure = StreamFailure::http(status.as_u16(), message);
        send_terminal(&tx, final_tx, Err(failure), notifier.as_ref()).await;
        return;
    }

    let bytes: ByteStream = Box::pin(response.bytes_stream().map(|next| next.map_err(Into::into)));
    pump(bytes, notifier, request_id, tx, final_tx, abort_rx).await;
}

/// Drives one byte stream through the decoder and delivers events in order.
async fn pump(
    mut bytes: ByteStream,
    notifier: Arc<dyn NotificationSink>,
    request_id: Uuid,
    tx: mpsc::Sender<ChatEvent>,
    final_tx: oneshot::Sender<Result<String, StreamFailure>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut decoder = StreamDecoder::default();
    let mut first_pending = true;
    let mut answer = String::new();

    loop {
        tokio::select! {
            _ = aborted(&mut abort_rx) => {
                debug!(%request_id, "chat stream cancelled");
                send_terminal(&tx, final_tx, Err(StreamFailure::Cancelled), notifier.as_ref()).await;
                return;
            }
            next = bytes.next() => match next {
                Some(Ok(chunk)) => {
                    debug!(%request_id, len = chunk.len(), "chat stream chunk");
                    for event in decoder.push_chunk(&chunk) {
                        match dispatch(event, &mut first_pending, &mut answer, &tx).await {
                            Dispatch::Continue => {}
                            Dispatch::Terminal(failure) => {
                                // Lines after a terminal error in the same
                                // chunk are dropped.
                                send_terminal(&tx, final_tx, Err(failure), notifier.as_ref()).await;
                                return;
                            }
                            Dispatch::ReceiverGone => {
                                let _ = final_tx.send(Err(StreamFailure::decode(
                                    "event receiver dropped mid-stream",
                                )));
                                return;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    let failure = StreamFailure::transport(format!("stream read failed: {e}"));
                    send_terminal(&tx, final_tx, Err(failure), notifier.as_ref()).await;
                    return;
                }
                None => {
                    // Stream end terminates any buffered final line.
                    if let Some(event) = decoder.finish() {
                        match dispatch(event, &mut first_pending, &mut answer, &tx).await {
                            Dispatch::Continue => {}
                            Dispatch::Terminal(failure) => {
                                send_terminal(&tx, final_tx, Err(failure), notifier.as_ref()).await;
                                return;
                            }
                            Dispatch::ReceiverGone => {
                                let _ = final_tx.send(Err(StreamFailure::decode(
                                    "event receiver dropped mid-stream",
                                )));
                                return;
                            }
                        }
                    }
                    debug!(%request_id, answer_len = answer.len(), "chat stream completed");
                    send_terminal(&tx, final_tx, Ok(answer), notifier.as_ref()).await;
                    return;
                }
            },
        }
    }
}

enum Dispatch {
    Continue,
    Terminal(StreamFailure),
    ReceiverGone,
}

async fn dispatch(
    event: WireEvent,
    first_pending: &mut bool,
    answer: &mut String,
    tx: &mpsc::Sender<ChatEvent>,
) -> Dispatch {
    let event = match event {
        WireEvent::Delta { answer: text, meta } => {
            let text = decode_unicode_escapes(&text);
            let is_first = std::mem::replace(first_pending, false);
            answer.push_str(&text);
            ChatEvent::Delta {
                text,
                is_first,
                meta,
            }
        }
        // A recovered parse failure does not consume the first-message flag.
        WireEvent::Partial { meta } => ChatEvent::Delta {
            text: String::new(),
            is_first: *first_pending,
            meta,
        },
        WireEvent::Thought(value) => ChatEvent::Thought(value),
        WireEvent::MessageEnd(value) => ChatEvent::MessageEnd(value),
        WireEvent::Error { message, code } => {
            return Dispatch::Terminal(StreamFailure::embedded(message, code));
        }
    };
    if tx.send(event).await.is_err() {
        return Dispatch::ReceiverGone;
    }
    Dispatch::Continue
}

/// Delivers the terminal event and the final outcome, notifying the sink for
/// every failure except cancellation.
async fn send_terminal(
    tx: &mpsc::Sender<ChatEvent>,
    final_tx: oneshot::Sender<Result<String, StreamFailure>>,
    outcome: Result<String, StreamFailure>,
    notifier: &dyn NotificationSink,
) {
    match outcome {
        Ok(answer) => {
            let _ = tx.send(ChatEvent::Completed).await;
            let _ = final_tx.send(Ok(answer));
        }
        Err(failure) => {
            if !failure.is_cancellation() {
                notifier.notify(NotificationKind::Error, &failure.user_message());
            }
            let _ = tx.send(ChatEvent::Failed(failure.clone())).await;
            let _ = final_tx.send(Err(failure));
        }
    }
}

/// Resolves when cancellation is requested; never resolves once all abort
/// handles are gone.
async fn aborted(abort_rx: &mut watch::Receiver<bool>) {
    loop {
        if *abort_rx.borrow() {
            return;
        }
        if abort_rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
