//! The switch that decides where customer audio, AI audio, supervisor audio,
//! and transcript publication go (spec §4.4). Pure decision logic: each rule
//! is a function from session state plus one inbound frame to the list of
//! actions the session loop should carry out. Kept free of I/O so the nine
//! ordered rules can be tested without a running transport or AI binding.

use super::state::{SessionMode, SessionState, TranscriptRole};

#[derive(Debug, Clone, PartialEq)]
pub enum RouterAction {
    AppendTranscript { role: TranscriptRole, content: String },
    SendAiAudio(String),
    SendAiText(String),
    SendCustomerAudio(String),
    SendCustomerAiResponse(String),
    SendCustomerSupervisorMessage(String),
    SendCustomerTranscription(String),
    SendControllerMessage(String),
    BroadcastAiResponse(String),
    BroadcastCustomerMessage(String),
    BroadcastCustomerAudio(String),
    TriggerAnalytics(String),
    Drop,
}

/// Rule 1: customer audio frame.
pub fn route_customer_audio(session: &SessionState, data: String) -> Vec<RouterAction> {
    if session.mode == SessionMode::Human && session.controller.is_some() {
        vec![RouterAction::BroadcastCustomerAudio(data)]
    } else {
        vec![RouterAction::SendAiAudio(data)]
    }
}

/// Rule 2: customer text frame (rare).
pub fn route_customer_text(session: &SessionState, content: String) -> Vec<RouterAction> {
    let mut actions = vec![RouterAction::AppendTranscript {
        role: TranscriptRole::Customer,
        content: content.clone(),
    }];
    if session.mode == SessionMode::Human {
        actions.push(RouterAction::SendControllerMessage(content));
    } else {
        actions.push(RouterAction::SendAiText(content));
    }
    actions
}

/// Rule 3: customer-supplied transcript caption. Never forwarded to the AI.
pub fn route_customer_transcript_caption(content: String) -> Vec<RouterAction> {
    vec![RouterAction::AppendTranscript {
        role: TranscriptRole::Customer,
        content,
    }]
}

/// Rule 4: AI `outputTranscriptChunk`, already sentence-finalized.
pub fn route_ai_output_chunk(content: String) -> Vec<RouterAction> {
    vec![
        RouterAction::AppendTranscript {
            role: TranscriptRole::Ai,
            content: content.clone(),
        },
        RouterAction::BroadcastAiResponse(content.clone()),
        RouterAction::SendCustomerAiResponse(content),
    ]
}

/// Rule 5: AI `inputTranscriptChunk`, already finalized and filtered.
pub fn route_ai_input_chunk(content: String) -> Vec<RouterAction> {
    vec![
        RouterAction::AppendTranscript {
            role: TranscriptRole::Customer,
            content: content.clone(),
        },
        RouterAction::BroadcastCustomerMessage(content.clone()),
        RouterAction::SendCustomerTranscription(content.clone()),
        RouterAction::TriggerAnalytics(content),
    ]
}

/// Rule 6: AI `audioChunk`.
pub fn route_ai_audio_chunk(session: &SessionState, data: String) -> Vec<RouterAction> {
    if session.mode == SessionMode::Human {
        vec![RouterAction::Drop]
    } else {
        vec![RouterAction::SendCustomerAudio(data)]
    }
}

/// Rule 7: supervisor audio frame, from the controller only.
pub fn route_supervisor_audio(session: &SessionState, data: String) -> Vec<RouterAction> {
    if session.mode == SessionMode::Human {
        vec![RouterAction::SendCustomerAudio(data)]
    } else {
        vec![RouterAction::Drop]
    }
}

/// Rule 8: supervisor text message.
pub fn route_supervisor_text(content: String) -> Vec<RouterAction> {
    vec![
        RouterAction::AppendTranscript {
            role: TranscriptRole::Supervisor,
            content: content.clone(),
        },
        RouterAction::SendCustomerSupervisorMessage(content),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ai_mode_session() -> SessionState {
        SessionState::new("s1".into())
    }

    fn human_mode_session() -> SessionState {
        let mut s = SessionState::new("s1".into());
        s.mode = SessionMode::Human;
        s.controller = Some(super::super::state::Controller {
            supervisor_id: "sup1".into(),
            taken_over_at: chrono::Utc::now(),
        });
        s
    }

    #[test]
    fn rule1_customer_audio_goes_to_ai_in_ai_mode() {
        let s = ai_mode_session();
        let actions = route_customer_audio(&s, "abc".into());
        assert_eq!(actions, vec![RouterAction::SendAiAudio("abc".into())]);
    }

    #[test]
    fn rule1_customer_audio_goes_to_supervisors_in_human_mode() {
        let s = human_mode_session();
        let actions = route_customer_audio(&s, "abc".into());
        assert_eq!(actions, vec![RouterAction::BroadcastCustomerAudio("abc".into())]);
    }

    #[test]
    fn rule2_customer_text_forwards_by_mode() {
        let ai = ai_mode_session();
        assert!(route_customer_text(&ai, "hi".into()).contains(&RouterAction::SendAiText("hi".into())));
        let human = human_mode_session();
        assert!(
            route_customer_text(&human, "hi".into()).contains(&RouterAction::SendControllerMessage("hi".into()))
        );
    }

    #[test]
    fn rule3_transcript_caption_never_reaches_ai() {
        let actions = route_customer_transcript_caption("caption text".into());
        assert_eq!(actions.len(), 1);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, RouterAction::SendAiText(_) | RouterAction::SendAiAudio(_))));
    }

    #[test]
    fn rule4_ai_output_chunk_appends_broadcasts_and_echoes() {
        let actions = route_ai_output_chunk("Hello.".into());
        assert!(actions.iter().any(|a| matches!(a, RouterAction::BroadcastAiResponse(_))));
        assert!(actions.iter().any(|a| matches!(a, RouterAction::SendCustomerAiResponse(_))));
    }

    #[test]
    fn rule5_ai_input_chunk_triggers_analytics() {
        let actions = route_ai_input_chunk("i need help".into());
        assert!(actions
            .iter()
            .any(|a| matches!(a, RouterAction::TriggerAnalytics(c) if c == "i need help")));
    }

    #[test]
    fn rule6_ai_audio_dropped_in_human_mode() {
        let s = human_mode_session();
        assert_eq!(route_ai_audio_chunk(&s, "x".into()), vec![RouterAction::Drop]);
    }

    #[test]
    fn rule6_ai_audio_forwarded_in_ai_mode() {
        let s = ai_mode_session();
        assert_eq!(route_ai_audio_chunk(&s, "x".into()), vec![RouterAction::SendCustomerAudio("x".into())]);
    }

    #[test]
    fn rule7_supervisor_audio_only_valid_while_human() {
        let human = human_mode_session();
        assert_eq!(route_supervisor_audio(&human, "x".into()), vec![RouterAction::SendCustomerAudio("x".into())]);
        let ai = ai_mode_session();
        assert_eq!(route_supervisor_audio(&ai, "x".into()), vec![RouterAction::Drop]);
    }

    #[test]
    fn rule8_supervisor_text_appends_and_forwards() {
        let actions = route_supervisor_text("please hold".into());
        assert!(actions.iter().any(|a| matches!(a,
            RouterAction::AppendTranscript { role: TranscriptRole::Supervisor, .. })));
        assert!(actions
            .iter()
            .any(|a| matches!(a, RouterAction::SendCustomerSupervisorMessage(_))));
    }
}
