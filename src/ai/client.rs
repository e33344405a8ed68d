//! AI streaming client: one duplex connection to the upstream conversational
//! AI provider (spec §4.2), grounded in the realtime-session handshake
//! pattern used for upstream voice providers elsewhere in this codebase.

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant as TokioInstant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transcript::{is_english, DebounceBuffer, EchoRing, OutputTranscriptPipeline, TranscriptionMode};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ProviderSink = futures_util::stream::SplitSink<WsStream, WsMessage>;
type ProviderStream = futures_util::stream::SplitStream<WsStream>;

/// `CONNECTING → READY → (PAUSED ↔ READY) → CLOSED`; `FAILED` reachable from
/// any state (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Connecting,
    Ready,
    Paused,
    Closed,
    Failed,
}

#[derive(Debug, Clone)]
pub enum AiEvent {
    SetupComplete,
    OutputTranscriptChunk(String),
    InputTranscriptChunk(String),
    /// base64(pcm), passed through as-is.
    AudioChunk(String),
    TurnComplete,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
enum AiError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
}

#[derive(Debug, Clone)]
pub struct AiBindingConfig {
    pub ws_url: String,
    pub api_key: String,
    pub voice_model: String,
    pub connect_timeout: Duration,
    pub debounce: Duration,
    pub echo_window: Duration,
    pub outbound_capacity: usize,
    pub transcription_mode: TranscriptionMode,
}

/// Builds the text sent to the AI as a user turn when a supervisor injects
/// context or hands a call back (spec §4.7, `contextPrompt(context)`).
pub fn context_prompt(context: &str) -> String {
    format!(
        "A human supervisor has provided the following context; incorporate it going forward: {context}"
    )
}

enum OutboundFrame {
    Audio(String),
    Text(String),
}

/// Handle to a live AI binding. Cheap to clone; the actual connection is
/// owned by a background task spawned in `connect`.
pub struct AiBinding {
    outbound_tx: mpsc::Sender<OutboundFrame>,
    state: Arc<Mutex<AiState>>,
    cancel: CancellationToken,
}

impl AiBinding {
    /// Starts connecting in the background and returns immediately in
    /// `CONNECTING` state. `events_tx` receives `setupComplete`/`error` and
    /// every subsequent inbound event.
    pub fn connect(cfg: AiBindingConfig, events_tx: mpsc::Sender<AiEvent>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(cfg.outbound_capacity);
        let state = Arc::new(Mutex::new(AiState::Connecting));
        let cancel = CancellationToken::new();

        tokio::spawn(run(cfg, outbound_rx, events_tx, state.clone(), cancel.clone()));

        Self {
            outbound_tx,
            state,
            cancel,
        }
    }

    /// Drop when paused or not READY (spec §4.2).
    pub fn send_audio(&self, data: String) -> bool {
        if *self.state.lock() != AiState::Ready {
            return false;
        }
        self.outbound_tx.try_send(OutboundFrame::Audio(data)).is_ok()
    }

    /// Drop when paused or not READY; used for context injection (spec §4.2).
    pub fn send_text(&self, text: String) -> bool {
        if *self.state.lock() != AiState::Ready {
            return false;
        }
        self.outbound_tx.try_send(OutboundFrame::Text(text)).is_ok()
    }

    /// Flip the gate; does not close the connection.
    pub fn pause(&self) {
        let mut s = self.state.lock();
        if *s == AiState::Ready {
            *s = AiState::Paused;
        }
    }

    /// Flip the gate; does not close the connection.
    pub fn resume(&self) {
        let mut s = self.state.lock();
        if *s == AiState::Paused {
            *s = AiState::Ready;
        }
    }

    /// Terminal.
    pub fn close(&self) {
        let mut s = self.state.lock();
        if *s != AiState::Closed && *s != AiState::Failed {
            *s = AiState::Closed;
        }
        drop(s);
        self.cancel.cancel();
    }

    pub fn state(&self) -> AiState {
        *self.state.lock()
    }
}

async fn run(
    cfg: AiBindingConfig,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    events_tx: mpsc::Sender<AiEvent>,
    state: Arc<Mutex<AiState>>,
    cancel: CancellationToken,
) {
    let handshake = timeout(cfg.connect_timeout, connect_and_handshake(&cfg)).await;
    let (mut sink, mut stream) = match handshake {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            *state.lock() = AiState::Failed;
            let _ = events_tx.send(AiEvent::Error(e.to_string())).await;
            return;
        }
        Err(_) => {
            *state.lock() = AiState::Failed;
            let _ = events_tx.send(AiEvent::Error(AiError::ConnectTimeout.to_string())).await;
            return;
        }
    };

    *state.lock() = AiState::Ready;
    let _ = events_tx.send(AiEvent::SetupComplete).await;

    let mut output = OutputTranscriptPipeline::new(cfg.transcription_mode);
    let mut debounce = DebounceBuffer::new();
    let mut echo = EchoRing::new(cfg.echo_window);
    let mut debounce_deadline: Option<TokioInstant> = None;

    loop {
        let sleep_branch = async {
            match debounce_deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep_branch => {
                debounce_deadline = None;
                finalize_input(&mut debounce, &mut echo, &events_tx).await;
            }
            maybe_frame = outbound_rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        if send_provider_frame(&mut sink, frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ProviderInbound>(&text) {
                            Ok(event) => {
                                let ok = handle_provider_event(
                                    event,
                                    &mut output,
                                    &mut debounce,
                                    &mut echo,
                                    &mut debounce_deadline,
                                    &cfg,
                                    &events_tx,
                                )
                                .await;
                                if !ok {
                                    *state.lock() = AiState::Failed;
                                    break;
                                }
                            }
                            Err(e) => debug!(error = %e, "discarding unparseable provider event"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        *state.lock() = AiState::Failed;
                        let _ = events_tx.send(AiEvent::Error("provider connection closed".into())).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        *state.lock() = AiState::Failed;
                        let _ = events_tx.send(AiEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        }

        if *state.lock() == AiState::Closed {
            break;
        }
    }

    let _ = sink.close().await;
}

async fn finalize_input(debounce: &mut DebounceBuffer, echo: &mut EchoRing, events_tx: &mpsc::Sender<AiEvent>) {
    if debounce.is_empty() {
        return;
    }
    let text = debounce.take();
    emit_if_not_echo(&text, echo, events_tx).await;
}

async fn emit_if_not_echo(text: &str, echo: &mut EchoRing, events_tx: &mpsc::Sender<AiEvent>) {
    let now = StdInstant::now();
    if !is_english(text) {
        debug!("dropping non-english transcript chunk");
        return;
    }
    if echo.is_echo(text, now) {
        debug!("dropping echoed transcript chunk");
        return;
    }
    let _ = events_tx.send(AiEvent::InputTranscriptChunk(text.to_string())).await;
}

#[allow(clippy::too_many_arguments)]
async fn handle_provider_event(
    event: ProviderInbound,
    output: &mut OutputTranscriptPipeline,
    debounce: &mut DebounceBuffer,
    echo: &mut EchoRing,
    debounce_deadline: &mut Option<TokioInstant>,
    cfg: &AiBindingConfig,
    events_tx: &mpsc::Sender<AiEvent>,
) -> bool {
    match event {
        ProviderInbound::SessionCreated {} | ProviderInbound::SessionUpdated {} => true,
        ProviderInbound::AudioTranscriptDelta { delta } => {
            if let Some(sentence) = output.push(&delta) {
                echo.record(&sentence, StdInstant::now());
                let _ = events_tx.send(AiEvent::OutputTranscriptChunk(sentence)).await;
            }
            true
        }
        ProviderInbound::AudioDelta { delta } => {
            let _ = events_tx.send(AiEvent::AudioChunk(delta)).await;
            true
        }
        ProviderInbound::InputTranscriptionDelta { delta } => {
            debounce.push(&delta);
            *debounce_deadline = Some(TokioInstant::now() + cfg.debounce);
            true
        }
        ProviderInbound::InputTranscriptionCompleted { transcript } => {
            // The provider's own completion event supersedes whatever the
            // debounce timer would have finalized; discard partial deltas.
            debounce.take();
            *debounce_deadline = None;
            emit_if_not_echo(&transcript, echo, events_tx).await;
            true
        }
        ProviderInbound::ResponseDone {} => {
            if let Some(sentence) = output.flush() {
                echo.record(&sentence, StdInstant::now());
                let _ = events_tx.send(AiEvent::OutputTranscriptChunk(sentence)).await;
            }
            // Turn completion also finalizes any input debounce buffer still
            // waiting on its quiet window, so a customer utterance right
            // before the AI responds isn't dropped on the floor.
            *debounce_deadline = None;
            finalize_input(debounce, echo, events_tx).await;
            let _ = events_tx.send(AiEvent::TurnComplete).await;
            true
        }
        ProviderInbound::Error { error } => {
            let _ = events_tx.send(AiEvent::Error(error.message)).await;
            false
        }
        ProviderInbound::Unknown => true,
    }
}

async fn connect_and_handshake(cfg: &AiBindingConfig) -> Result<(ProviderSink, ProviderStream), AiError> {
    let mut request = cfg
        .ws_url
        .as_str()
        .into_client_request()
        .map_err(|e| AiError::ConnectFailed(e.to_string()))?;
    request.headers_mut().insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cfg.api_key)).map_err(|e| AiError::ConnectFailed(e.to_string()))?,
    );

    let (ws_stream, _response) = connect_async(request)
        .await
        .map_err(|e| AiError::ConnectFailed(e.to_string()))?;
    let (mut sink, mut stream) = ws_stream.split();

    let session_update = ProviderOutbound::SessionUpdate {
        session: ProviderSessionConfig {
            model: cfg.voice_model.clone(),
        },
    };
    let text = serde_json::to_string(&session_update).expect("session update always serializes");
    sink.send(WsMessage::Text(text.into()))
        .await
        .map_err(|e| AiError::ConnectFailed(e.to_string()))?;

    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ProviderInbound>(&text) {
                Ok(ProviderInbound::SessionCreated {}) | Ok(ProviderInbound::SessionUpdated {}) => {
                    return Ok((sink, stream));
                }
                Ok(ProviderInbound::Error { error }) => return Err(AiError::ConnectFailed(error.message)),
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "unparseable event during provider handshake");
                    continue;
                }
            },
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(AiError::ConnectFailed("connection closed during setup".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(AiError::ConnectFailed(e.to_string())),
        }
    }
}

async fn send_provider_frame(sink: &mut ProviderSink, frame: OutboundFrame) -> Result<(), ()> {
    match frame {
        OutboundFrame::Audio(data) => {
            let msg = ProviderOutbound::InputAudioBufferAppend { audio: data };
            let text = serde_json::to_string(&msg).map_err(|_| ())?;
            sink.send(WsMessage::Text(text.into())).await.map_err(|_| ())
        }
        OutboundFrame::Text(text) => {
            let item = ProviderOutbound::ConversationItemCreate {
                item: ProviderConversationItem {
                    kind: "message",
                    role: "user",
                    content: vec![ProviderContentPart {
                        kind: "input_text",
                        text,
                    }],
                },
            };
            let item_text = serde_json::to_string(&item).map_err(|_| ())?;
            sink.send(WsMessage::Text(item_text.into())).await.map_err(|_| ())?;

            let respond = serde_json::to_string(&ProviderOutbound::ResponseCreate {}).map_err(|_| ())?;
            sink.send(WsMessage::Text(respond.into())).await.map_err(|_| ())
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ProviderOutbound {
    #[serde(rename = "session.update")]
    SessionUpdate { session: ProviderSessionConfig },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ProviderConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate {},
}

#[derive(Serialize)]
struct ProviderSessionConfig {
    model: String,
}

#[derive(Serialize)]
struct ProviderConversationItem {
    #[serde(rename = "type")]
    kind: &'static str,
    role: &'static str,
    content: Vec<ProviderContentPart>,
}

#[derive(Serialize)]
struct ProviderContentPart {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ProviderInbound {
    #[serde(rename = "session.created")]
    SessionCreated {},
    #[serde(rename = "session.updated")]
    SessionUpdated {},
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptionDelta { delta: String },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },
    #[serde(rename = "response.done")]
    ResponseDone {},
    #[serde(rename = "error")]
    Error { error: ProviderErrorDetail },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prompt_embeds_context() {
        let prompt = context_prompt("customer is on the premium plan");
        assert!(prompt.contains("customer is on the premium plan"));
    }

    #[tokio::test]
    async fn finalize_input_drops_non_english() {
        let mut debounce = DebounceBuffer::new();
        let mut echo = EchoRing::new(Duration::from_secs(10));
        let (tx, mut rx) = mpsc::channel(4);
        debounce.push("123 !! ##");
        finalize_input(&mut debounce, &mut echo, &tx).await;
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn finalize_input_emits_plain_english() {
        let mut debounce = DebounceBuffer::new();
        let mut echo = EchoRing::new(Duration::from_secs(10));
        let (tx, mut rx) = mpsc::channel(4);
        debounce.push("I need help with my order");
        finalize_input(&mut debounce, &mut echo, &tx).await;
        match rx.recv().await {
            Some(AiEvent::InputTranscriptChunk(text)) => assert_eq!(text, "I need help with my order"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_event_dispatch_handles_response_done() {
        let mut output = OutputTranscriptPipeline::new(TranscriptionMode::BufferedSentence);
        output.push("residual text");
        let mut debounce = DebounceBuffer::new();
        let mut echo = EchoRing::new(Duration::from_secs(10));
        let mut deadline = None;
        let cfg = AiBindingConfig {
            ws_url: "wss://example.invalid".into(),
            api_key: "key".into(),
            voice_model: "gpt-4o-realtime-preview".into(),
            connect_timeout: Duration::from_secs(1),
            debounce: Duration::from_millis(400),
            echo_window: Duration::from_secs(10),
            outbound_capacity: 8,
            transcription_mode: TranscriptionMode::BufferedSentence,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let ok = handle_provider_event(
            ProviderInbound::ResponseDone {},
            &mut output,
            &mut debounce,
            &mut echo,
            &mut deadline,
            &cfg,
            &tx,
        )
        .await;
        assert!(ok);
        assert!(matches!(rx.recv().await, Some(AiEvent::OutputTranscriptChunk(_))));
        assert!(matches!(rx.recv().await, Some(AiEvent::TurnComplete)));
    }

    #[tokio::test]
    async fn response_done_finalizes_pending_input_debounce() {
        let mut output = OutputTranscriptPipeline::new(TranscriptionMode::BufferedSentence);
        let mut debounce = DebounceBuffer::new();
        debounce.push("still waiting on the quiet window");
        let mut echo = EchoRing::new(Duration::from_secs(10));
        let mut deadline = Some(TokioInstant::now() + Duration::from_millis(400));
        let cfg = AiBindingConfig {
            ws_url: "wss://example.invalid".into(),
            api_key: "key".into(),
            voice_model: "gpt-4o-realtime-preview".into(),
            connect_timeout: Duration::from_secs(1),
            debounce: Duration::from_millis(400),
            echo_window: Duration::from_secs(10),
            outbound_capacity: 8,
            transcription_mode: TranscriptionMode::BufferedSentence,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let ok = handle_provider_event(
            ProviderInbound::ResponseDone {},
            &mut output,
            &mut debounce,
            &mut echo,
            &mut deadline,
            &cfg,
            &tx,
        )
        .await;
        assert!(ok);
        assert!(deadline.is_none());
        match rx.recv().await {
            Some(AiEvent::InputTranscriptChunk(text)) => assert_eq!(text, "still waiting on the quiet window"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(AiEvent::TurnComplete)));
    }
}
