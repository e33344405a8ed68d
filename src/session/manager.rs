//! Session manager (spec §4.7, §5): creates one session loop per customer
//! attach and routes supervisor commands to the right loop. The loop is the
//! sole mutator of its `SessionState`; every other producer (customer
//! transport, AI binding, analytics dispatcher, supervisor transport) hands
//! it a tagged [`SessionEvent`] over one bounded channel.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::{context_prompt, AiBinding, AiBindingConfig, AiEvent, AiState, TranscriptionMode};
use crate::analytics::{
    should_escalate, AnalysisInput, AnalyticsDispatcher, AnalyticsProvider, AnalyticsResult, CoachingInput,
    SentimentInput,
};
use crate::config::Config;
use crate::error::CommandError;
use crate::session::events::{CommandAck, CommandReply, SessionEvent};
use crate::session::router::{self};
use crate::session::state::{Controller, SessionMode, SessionState, SessionStatus, TranscriptEntry, TranscriptRole};
use crate::summary::{build_record, compute_summary, SummaryWriter};
use crate::supervisor::SupervisorRegistry;
use crate::transport::wire::{AiResponseData, CustomerInbound, CustomerOutbound, SupervisorCommand, SupervisorEvent};
use crate::transport::{CloseReason, TransportError, WsTransport};

/// Process-wide index of live sessions plus the last-published read view
/// each session loop leaves behind for the control surface (spec §5,
/// "external readers use snapshot() and fullTranscript() served by the loop").
pub struct SessionManager {
    sessions: DashMap<String, mpsc::Sender<SessionEvent>>,
    snapshots: DashMap<String, Value>,
    transcripts: DashMap<String, Vec<TranscriptEntry>>,
    registry: Arc<SupervisorRegistry>,
    provider: Arc<dyn AnalyticsProvider>,
    summary_writer: Arc<SummaryWriter>,
    config: Arc<Config>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<SupervisorRegistry>,
        provider: Arc<dyn AnalyticsProvider>,
        summary_writer: Arc<SummaryWriter>,
        config: Arc<Config>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            snapshots: DashMap::new(),
            transcripts: DashMap::new(),
            registry,
            provider,
            summary_writer,
            config,
        })
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_snapshots(&self) -> Vec<Value> {
        self.snapshots.iter().map(|e| e.value().clone()).collect()
    }

    pub fn session_snapshot(&self, session_id: &str) -> Option<Value> {
        self.snapshots.get(session_id).map(|e| e.value().clone())
    }

    pub fn session_transcript(&self, session_id: &str) -> Option<Vec<TranscriptEntry>> {
        self.transcripts.get(session_id).map(|e| e.value().clone())
    }

    /// Creates a session for a just-attached customer transport and spawns
    /// its loop. Returns the new session id.
    pub fn spawn_session(
        self: &Arc<Self>,
        customer_transport: WsTransport<CustomerOutbound>,
        customer_rx: mpsc::Receiver<CustomerInbound>,
    ) -> String {
        let session_id = Uuid::new_v4().to_string();
        let (event_tx, event_rx) = mpsc::channel(256);
        self.sessions.insert(session_id.clone(), event_tx.clone());

        let manager = self.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            run_session_loop(manager, id, customer_transport, customer_rx, event_tx, event_rx).await;
        });

        session_id
    }

    /// Routes a supervisor command to its session loop, except `getSessions`
    /// which isn't scoped to a session.
    pub async fn dispatch_command(&self, command: SupervisorCommand) -> CommandReply {
        if matches!(command, SupervisorCommand::GetSessions) {
            return Ok(CommandAck::SessionsList(self.session_snapshots()));
        }

        let session_id = command_session_id(&command).to_string();
        let Some(tx) = self.sessions.get(&session_id).map(|e| e.value().clone()) else {
            return Err(CommandError::SessionNotFound(session_id));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(SessionEvent::Supervisor(command, reply_tx)).await.is_err() {
            return Err(CommandError::SessionNotFound(session_id));
        }
        reply_rx.await.unwrap_or(Err(CommandError::SessionNotFound(session_id)))
    }

    /// Forwards a decoded customer frame to its session loop.
    pub async fn forward_customer_message(&self, session_id: &str, msg: CustomerInbound) {
        if let Some(tx) = self.sessions.get(session_id).map(|e| e.value().clone()) {
            let _ = tx.send(SessionEvent::Customer(msg)).await;
        }
    }

    fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
        self.snapshots.remove(session_id);
        self.transcripts.remove(session_id);
    }

    fn publish_snapshot(&self, session_id: &str, value: Value) {
        self.snapshots.insert(session_id.to_string(), value);
    }

    fn publish_transcript(&self, session_id: &str, transcript: Vec<TranscriptEntry>) {
        self.transcripts.insert(session_id.to_string(), transcript);
    }
}

fn command_session_id(command: &SupervisorCommand) -> &str {
    match command {
        SupervisorCommand::Takeover { session_id, .. }
        | SupervisorCommand::Handback { session_id, .. }
        | SupervisorCommand::InjectContext { session_id, .. }
        | SupervisorCommand::SupervisorMessage { session_id, .. }
        | SupervisorCommand::SupervisorAudio { session_id, .. }
        | SupervisorCommand::EndCall { session_id } => session_id,
        SupervisorCommand::GetSessions => unreachable!("getSessions is handled by the manager directly"),
    }
}

/// The live collaborators one session loop owns (spec §5, "tasks per session").
struct Session {
    state: SessionState,
    customer_transport: WsTransport<CustomerOutbound>,
    ai: AiBinding,
    dispatcher: AnalyticsDispatcher,
    registry: Arc<SupervisorRegistry>,
    provider: Arc<dyn AnalyticsProvider>,
    summary_writer: Arc<SummaryWriter>,
    config: Arc<Config>,
}

impl Session {
    fn publish(&self, manager: &SessionManager) {
        if let Ok(v) = serde_json::to_value(self.state.snapshot()) {
            manager.publish_snapshot(&self.state.id, v);
        }
        manager.publish_transcript(&self.state.id, self.state.full_transcript());
    }

    fn recent_contents(&self, n: usize) -> Vec<String> {
        let len = self.state.transcript.len();
        self.state.transcript[len.saturating_sub(n)..]
            .iter()
            .map(|e| e.content.clone())
            .collect()
    }

    fn trigger_analytics(&mut self, triggering: String) {
        let recent = self.recent_contents(5);
        self.dispatcher.trigger_sentiment(SentimentInput {
            latest: triggering.clone(),
            recent: recent.clone(),
        });
        let transcript_text = self
            .state
            .transcript
            .iter()
            .map(|e| e.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        self.dispatcher.trigger_analysis(AnalysisInput { transcript: transcript_text });
        self.dispatcher.trigger_coaching(CoachingInput { recent, triggering });
    }

    /// Sends one frame to the customer transport. A congested outbox ends
    /// the call with `CustomerCongested` (spec §5, "customer outbox
    /// capacity ... overflow closes the session") instead of silently
    /// dropping the frame; `end_call` is idempotent so callers further
    /// along in the same batch don't need to check for reentrancy.
    async fn send_customer(&mut self, msg: CustomerOutbound) -> bool {
        match self.customer_transport.send(msg) {
            Ok(()) => true,
            Err(TransportError::PeerSlow) => {
                Box::pin(self.end_call(CloseReason::CustomerCongested)).await;
                false
            }
            Err(TransportError::PeerGone) => false,
        }
    }

    /// Executes one router decision. Several actions in the same batch that
    /// follow an `AppendTranscript` share its sequence number, since they
    /// describe the same transcript event to different audiences.
    async fn apply(&mut self, actions: Vec<router::RouterAction>) {
        use router::RouterAction;

        let mut seq = 0u64;
        for action in actions {
            match action {
                RouterAction::AppendTranscript { role, content } => {
                    seq = self.state.append(role, content);
                }
                RouterAction::SendAiAudio(data) => {
                    self.ai.send_audio(data);
                }
                RouterAction::SendAiText(text) => {
                    self.ai.send_text(text);
                }
                RouterAction::SendCustomerAudio(data) => {
                    self.send_customer(CustomerOutbound::Audio { data }).await;
                }
                RouterAction::SendCustomerAiResponse(content) => {
                    self.send_customer(CustomerOutbound::AiResponse {
                        data: AiResponseData { kind: "text", content },
                    })
                    .await;
                }
                RouterAction::SendCustomerSupervisorMessage(content) => {
                    self.send_customer(CustomerOutbound::SupervisorMessage { content }).await;
                }
                RouterAction::SendCustomerTranscription(content) => {
                    self.send_customer(CustomerOutbound::CustomerTranscription { content }).await;
                }
                RouterAction::SendControllerMessage(content) => {
                    if seq == 0 {
                        seq = self.state.next_sequence();
                    }
                    if let Some(controller) = self.state.controller.clone() {
                        self.registry.send_to(
                            &controller.supervisor_id,
                            &SupervisorEvent::CustomerMessage {
                                session_id: self.state.id.clone(),
                                seq,
                                content,
                            },
                        );
                    }
                }
                RouterAction::BroadcastAiResponse(content) => {
                    if seq == 0 {
                        seq = self.state.next_sequence();
                    }
                    self.registry.broadcast(&SupervisorEvent::AiResponse {
                        session_id: self.state.id.clone(),
                        seq,
                        content,
                    });
                }
                RouterAction::BroadcastCustomerMessage(content) => {
                    if seq == 0 {
                        seq = self.state.next_sequence();
                    }
                    self.registry.broadcast(&SupervisorEvent::CustomerMessage {
                        session_id: self.state.id.clone(),
                        seq,
                        content,
                    });
                }
                RouterAction::BroadcastCustomerAudio(data) => {
                    if seq == 0 {
                        seq = self.state.next_sequence();
                    }
                    self.registry.broadcast(&SupervisorEvent::CustomerAudio {
                        session_id: self.state.id.clone(),
                        seq,
                        data,
                    });
                }
                RouterAction::TriggerAnalytics(content) => self.trigger_analytics(content),
                RouterAction::Drop => {}
            }
        }
    }

    async fn handle_customer_message(&mut self, msg: CustomerInbound) {
        if self.state.status == SessionStatus::Waiting {
            self.state.status = SessionStatus::Active;
        }
        let actions = match msg {
            CustomerInbound::Audio { data } => router::route_customer_audio(&self.state, data),
            CustomerInbound::Text { content } => router::route_customer_text(&self.state, content),
            CustomerInbound::Transcript { content } => router::route_customer_transcript_caption(content),
        };
        self.apply(actions).await;
    }

    /// Returns `false` when the AI failure should end the session (spec §7,
    /// "Provider failure").
    async fn handle_ai_event(&mut self, event: AiEvent) -> bool {
        match event {
            AiEvent::SetupComplete => {}
            AiEvent::OutputTranscriptChunk(text) => self.apply(router::route_ai_output_chunk(text)).await,
            AiEvent::InputTranscriptChunk(text) => self.apply(router::route_ai_input_chunk(text)).await,
            AiEvent::AudioChunk(data) => self.apply(router::route_ai_audio_chunk(&self.state, data)).await,
            AiEvent::TurnComplete => {}
            AiEvent::Error(message) => {
                warn!(session_id = %self.state.id, error = %message, "AI binding failed");
                if self.state.mode == SessionMode::Human {
                    if let Some(controller) = &self.state.controller {
                        self.registry.send_to(
                            &controller.supervisor_id,
                            &SupervisorEvent::Error {
                                session_id: Some(self.state.id.clone()),
                                message,
                            },
                        );
                    }
                } else {
                    return false;
                }
            }
        }
        true
    }

    fn broadcast_session_update(&mut self) {
        let seq = self.state.next_sequence();
        if let Ok(snapshot) = serde_json::to_value(self.state.snapshot()) {
            self.registry.broadcast(&SupervisorEvent::SessionUpdate {
                session_id: self.state.id.clone(),
                seq,
                snapshot,
            });
        }
    }

    fn apply_analytics(&mut self, result: AnalyticsResult) {
        match result {
            AnalyticsResult::Sentiment { result, .. } => {
                self.state
                    .record_frustration(result.score, result.sentiment.clone(), result.reason.clone());
                let seq = self.state.next_sequence();
                self.registry.broadcast(&SupervisorEvent::FrustrationUpdate {
                    session_id: self.state.id.clone(),
                    seq,
                    score: result.score,
                    sentiment: result.sentiment.clone(),
                    reason: result.reason.clone(),
                });

                let escalate = result.should_escalate
                    || should_escalate(result.score, &result.sentiment, self.config.escalation_score_threshold);
                if escalate {
                    let seq = self.state.next_sequence();
                    self.state.escalation_alerts.push(serde_json::json!({
                        "seq": seq,
                        "reason": result.reason,
                        "at": Utc::now(),
                    }));
                    self.registry.broadcast(&SupervisorEvent::EscalationAlert {
                        session_id: self.state.id.clone(),
                        seq,
                        reason: result.reason,
                    });
                }
            }
            AnalyticsResult::Analysis { result, .. } => {
                let seq = self.state.next_sequence();
                let payload = serde_json::to_value(&result).unwrap_or(Value::Null);
                self.registry.broadcast(&SupervisorEvent::AnalyticsUpdate {
                    session_id: self.state.id.clone(),
                    seq,
                    payload,
                });
            }
            AnalyticsResult::Coaching { result, .. } => {
                let seq = self.state.next_sequence();
                let payload = serde_json::to_value(&result).unwrap_or(Value::Null);
                self.registry.broadcast(&SupervisorEvent::CoachingUpdate {
                    session_id: self.state.id.clone(),
                    seq,
                    payload,
                });
            }
        }
    }

    async fn handle_supervisor_command(&mut self, cmd: SupervisorCommand) -> CommandReply {
        match cmd {
            SupervisorCommand::Takeover { supervisor_id, .. } => {
                if self.state.status != SessionStatus::Active {
                    return Err(CommandError::WrongMode);
                }
                self.state.mode = SessionMode::Human;
                self.state.controller = Some(Controller {
                    supervisor_id,
                    taken_over_at: Utc::now(),
                });
                self.ai.pause();
                self.state.supervisor_interventions += 1;
                if self
                    .send_customer(CustomerOutbound::ModeChange {
                        mode: "human",
                        message: "A support specialist has joined the call.".into(),
                    })
                    .await
                {
                    self.broadcast_session_update();
                }
                Ok(CommandAck::Ack)
            }
            SupervisorCommand::Handback { context, .. } => {
                if self.state.mode != SessionMode::Human {
                    return Err(CommandError::WrongMode);
                }
                self.state.controller = None;
                self.state.mode = SessionMode::Ai;
                self.ai.resume();
                if let Some(ctx) = context {
                    self.ai.send_text(context_prompt(&ctx));
                }
                if self
                    .send_customer(CustomerOutbound::ModeChange {
                        mode: "ai",
                        message: "You are now speaking with the AI assistant.".into(),
                    })
                    .await
                {
                    self.broadcast_session_update();
                }
                Ok(CommandAck::Ack)
            }
            SupervisorCommand::InjectContext { context, .. } => {
                if self.state.mode != SessionMode::Ai || self.ai.state() != AiState::Ready {
                    return Err(CommandError::AiNotReady);
                }
                self.state.append(TranscriptRole::Customer, context.clone());
                if !self.ai.send_text(context_prompt(&context)) {
                    return Err(CommandError::ContextInjectionFailed("AI binding rejected the context".into()));
                }
                self.trigger_analytics(context);
                self.publish_placeholder();
                Ok(CommandAck::ContextInjected)
            }
            SupervisorCommand::SupervisorMessage { content, .. } => {
                if self.state.mode != SessionMode::Human {
                    return Err(CommandError::WrongMode);
                }
                self.apply(router::route_supervisor_text(content)).await;
                Ok(CommandAck::Ack)
            }
            SupervisorCommand::SupervisorAudio { data, .. } => {
                if self.state.mode != SessionMode::Human {
                    return Err(CommandError::WrongMode);
                }
                self.apply(router::route_supervisor_audio(&self.state, data)).await;
                Ok(CommandAck::Ack)
            }
            SupervisorCommand::EndCall { .. } => {
                self.end_call(CloseReason::SessionEnded).await;
                Ok(CommandAck::Ack)
            }
            SupervisorCommand::GetSessions => unreachable!("getSessions is handled by the manager directly"),
        }
    }

    // `apply`'s sequence-tracking only applies within one router batch; this
    // just marks that state changed so the caller's snapshot republish picks
    // it up (the loop republishes after every event regardless).
    fn publish_placeholder(&self) {}

    async fn end_call(&mut self, reason: CloseReason) {
        if self.state.status == SessionStatus::Ended {
            return;
        }
        // Set before the customer send below: a congested outbox there
        // reenters `end_call` through `send_customer`, and this guard is
        // what makes that reentry a no-op instead of a double teardown.
        self.state.status = SessionStatus::Ended;
        self.state.ended_at = Some(Utc::now());

        let message = match reason {
            CloseReason::AiUnavailable => "The AI assistant is currently unavailable.".to_string(),
            CloseReason::CustomerCongested => "Your connection could not keep up and the call ended.".to_string(),
            _ => "The call has ended.".to_string(),
        };
        self.send_customer(CustomerOutbound::SessionEnded { message }).await;
        self.customer_transport.close();
        self.ai.close();

        let transcript = self.state.full_transcript();
        let summary = compute_summary(self.provider.as_ref(), &transcript).await;
        let ended_at = self.state.ended_at.expect("just set");
        let record = build_record(&self.state, summary, ended_at);
        self.summary_writer.enqueue(record).await;

        // spec §4.7/§8: a `sessionUpdate` reflecting the ended status is
        // broadcast alongside the terminal `sessionEnded` event.
        self.broadcast_session_update();

        let seq = self.state.next_sequence();
        self.registry.broadcast(&SupervisorEvent::SessionEnded {
            session_id: self.state.id.clone(),
            seq,
            status: "ended",
        });
    }
}

async fn run_session_loop(
    manager: Arc<SessionManager>,
    session_id: String,
    customer_transport: WsTransport<CustomerOutbound>,
    mut customer_rx: mpsc::Receiver<CustomerInbound>,
    event_tx: mpsc::Sender<SessionEvent>,
    mut event_rx: mpsc::Receiver<SessionEvent>,
) {
    let config = manager.config.clone();

    let (ai_events_tx, mut ai_events_rx) = mpsc::channel(64);
    let ai = AiBinding::connect(
        AiBindingConfig {
            ws_url: config.ai_provider_ws_url.clone(),
            api_key: config.api_key.clone(),
            voice_model: config.voice_model.clone(),
            connect_timeout: config.connect_timeout(),
            debounce: config.debounce(),
            echo_window: config.echo_window(),
            outbound_capacity: config.ai_outbound_audio_capacity,
            transcription_mode: TranscriptionMode::BufferedSentence,
        },
        ai_events_tx,
    );

    let (analytics_tx, mut analytics_rx) = mpsc::channel(32);
    let dispatcher = AnalyticsDispatcher::spawn(
        manager.provider.clone(),
        config.analytics_timeout(),
        analytics_tx,
        session_id.clone(),
    );

    // Two receive pumps (spec §5): forward customer frames and AI events
    // into the session loop's single inbound channel.
    let customer_forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(msg) = customer_rx.recv().await {
            if customer_forward_tx.send(SessionEvent::Customer(msg)).await.is_err() {
                break;
            }
        }
        let _ = customer_forward_tx.send(SessionEvent::CustomerClosed).await;
    });

    let ai_forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = ai_events_rx.recv().await {
            if ai_forward_tx.send(SessionEvent::Ai(event)).await.is_err() {
                break;
            }
        }
    });

    let analytics_forward_tx = event_tx;
    tokio::spawn(async move {
        while let Some(result) = analytics_rx.recv().await {
            if analytics_forward_tx.send(SessionEvent::Analytics(result)).await.is_err() {
                break;
            }
        }
    });

    let mut state = SessionState::new(session_id.clone());
    state.status = SessionStatus::Waiting;
    state.customer_connected = true;

    if customer_transport
        .send(CustomerOutbound::SessionInit {
            session_id: session_id.clone(),
            mode: "ai",
        })
        .is_err()
    {
        customer_transport.close();
        ai.close();
        manager.remove(&session_id);
        warn!(session_id = %session_id, "customer disconnected before session init could be sent");
        return;
    }

    let mut session = Session {
        state,
        customer_transport,
        ai,
        dispatcher,
        registry: manager.registry.clone(),
        provider: manager.provider.clone(),
        summary_writer: manager.summary_writer.clone(),
        config,
    };
    session.publish(&manager);

    while let Some(event) = event_rx.recv().await {
        match event {
            SessionEvent::Customer(msg) => session.handle_customer_message(msg).await,
            SessionEvent::CustomerClosed => {
                session.state.customer_connected = false;
                session.end_call(CloseReason::CustomerDetached).await;
            }
            SessionEvent::Ai(ai_event) => {
                if !session.handle_ai_event(ai_event).await {
                    session.end_call(CloseReason::AiUnavailable).await;
                }
            }
            SessionEvent::Analytics(result) => session.apply_analytics(result),
            SessionEvent::Supervisor(cmd, reply) => {
                let result = session.handle_supervisor_command(cmd).await;
                let _ = reply.send(result);
            }
        }

        session.publish(&manager);

        if session.state.status == SessionStatus::Ended {
            break;
        }
    }

    manager.remove(&session_id);
    info!(session_id = %session_id, "session loop exited");
}
