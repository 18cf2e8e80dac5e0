//! The chat turn orchestrator.
//!
//! One `execute` call runs a full turn: merge the request's context into
//! the session, validate, rate-limit, stream the partner's reply while
//! accumulating it, persist the final text, and fan out the background
//! evaluations. Validation and rate-limit failures are the only
//! synchronous errors; once streaming begins, every failure resolves to
//! text the client can show.

use std::sync::Arc;

use chrono::Utc;
use futures_channel::mpsc;
use futures_util::StreamExt;
use tokio::sync::oneshot;

use parley_shared::{ChatTurnRequest, TurnKind, TurnRole};

use crate::infrastructure::ports::{ChatMessage, CompletionPort};
use crate::prompts::{self, CONTINUE_MARKER};
use crate::session::{
    is_plausible_language, Difficulty, Message, RateLimiter, SessionHandle, SessionStore,
    HISTORY_WINDOW, MAX_MESSAGES,
};
use crate::use_cases::feedback::EvaluateFeedback;
use crate::use_cases::task_check::{CheckTaskCompletion, CheckTaskInput};

/// Recorded and shown when neither the stream nor the one-shot fallback
/// produced usable text.
pub const FALLBACK_APOLOGY: &str = "Network error. Try again.";

/// Synthetic instruction appended for a continuation turn.
const CONTINUE_NUDGE: &str = "Continue the scene with the next natural step. Keep it concise.";

/// Text retained past the released prefix while streaming, so a trailing
/// continuation marker (plus surrounding whitespace) never reaches the
/// client before it can be stripped.
const MARKER_HOLDBACK: usize = CONTINUE_MARKER.len() + 8;

/// Synchronous rejections, surfaced before any model call.
#[derive(Debug, thiserror::Error)]
pub enum ChatTurnError {
    #[error("Empty message")]
    EmptyMessage,
    #[error("Language not set")]
    LanguageNotSet,
    #[error("Rate limited")]
    RateLimited,
}

/// One streamed item of a turn's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// Incremental reply text.
    Chunk(String),
    /// Terminal failure; `message` is already recorded in the session.
    Failed { message: String },
}

/// How the primary reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Fragments streamed from the provider.
    Streamed,
    /// The stream failed before any content; the one-shot fallback text
    /// was forwarded in one piece.
    StreamedWithFallback,
    /// Both paths failed; the apology was recorded instead.
    Failed,
}

/// Completion record for one turn, delivered after the event channel
/// closes.
#[derive(Debug)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// True when the model requested, and received, an automatic
    /// continuation turn.
    pub continued: bool,
    /// The recorded primary reply (marker-stripped).
    pub text: String,
}

/// Handle to a running turn.
pub struct ChatTurnStream {
    pub session_id: String,
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
    pub report: oneshot::Receiver<TurnReport>,
}

pub struct ChatTurnInput {
    pub client_ip: String,
    pub request: ChatTurnRequest,
}

/// Orchestrates one chat turn end to end.
#[derive(Clone)]
pub struct ChatTurn {
    sessions: Arc<SessionStore>,
    rate: Arc<RateLimiter>,
    llm: Arc<dyn CompletionPort>,
    feedback: Arc<EvaluateFeedback>,
    task_check: Arc<CheckTaskCompletion>,
}

impl ChatTurn {
    pub fn new(
        sessions: Arc<SessionStore>,
        rate: Arc<RateLimiter>,
        llm: Arc<dyn CompletionPort>,
        feedback: Arc<EvaluateFeedback>,
        task_check: Arc<CheckTaskCompletion>,
    ) -> Self {
        Self {
            sessions,
            rate,
            llm,
            feedback,
            task_check,
        }
    }

    /// Validate and launch one turn. The returned stream yields reply
    /// events as they are produced; the turn keeps running to completion
    /// (persistence, fan-out, continuation) even if the receiver is
    /// dropped.
    pub async fn execute(&self, input: ChatTurnInput) -> Result<ChatTurnStream, ChatTurnError> {
        let request = input.request;
        let kind = request.kind;
        let message = request
            .message
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string();

        let (handle, created) =
            self.sessions.get_or_create(request.session_id.as_deref());

        let (session_id, language) = merge_context(&handle, &request).await;

        let Some(language) = language else {
            return Err(ChatTurnError::LanguageNotSet);
        };
        if kind == TurnKind::User && message.is_empty() {
            return Err(ChatTurnError::EmptyMessage);
        }
        if !self.rate.check(&input.client_ip, Some(&session_id)) {
            return Err(ChatTurnError::RateLimited);
        }

        if created {
            tracing::debug!(session_id = %session_id, "Created session on first chat turn");
        }

        if kind == TurnKind::User && !client_already_sent(&request, &message) {
            self.sessions
                .append_turn(&handle, TurnRole::User, &message)
                .await;
        }

        let turns = self.build_turns(&handle, kind).await;

        let (tx, rx) = mpsc::unbounded();
        let (report_tx, report_rx) = oneshot::channel();

        let this = self.clone();
        let producer_handle = handle.clone();
        let producer_language = language.clone();
        tokio::spawn(async move {
            let report = this
                .run_turn(producer_handle, kind, turns, producer_language, tx)
                .await;
            let _ = report_tx.send(report);
        });

        Ok(ChatTurnStream {
            session_id,
            events: rx,
            report: report_rx,
        })
    }

    /// Full turn body, run on its own task: primary reply, persistence,
    /// fan-out, and at most one automatic continuation.
    async fn run_turn(
        &self,
        handle: SessionHandle,
        kind: TurnKind,
        turns: Vec<ChatMessage>,
        language: String,
        tx: mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnReport {
        let Some(reply) = self.run_model_turn(turns, &tx).await else {
            self.sessions
                .append_turn(&handle, TurnRole::Assistant, FALLBACK_APOLOGY)
                .await;
            let _ = tx.unbounded_send(TurnEvent::Failed {
                message: FALLBACK_APOLOGY.to_string(),
            });
            return TurnReport {
                outcome: TurnOutcome::Failed,
                continued: false,
                text: FALLBACK_APOLOGY.to_string(),
            };
        };

        self.sessions
            .append_turn(&handle, TurnRole::Assistant, &reply.text)
            .await;

        if kind != TurnKind::Start {
            self.dispatch_fanout(&handle, &language).await;
        }

        // One automatic continuation per user turn; a continuation never
        // schedules another, so self-dialogue cannot run away.
        let continued = reply.wants_continuation && kind == TurnKind::User;
        if continued {
            let _ = tx.unbounded_send(TurnEvent::Chunk("\n\n".to_string()));
            let turns = self.build_turns(&handle, TurnKind::Continue).await;
            if let Some(extra) = self.run_model_turn(turns, &tx).await {
                self.sessions
                    .append_turn(&handle, TurnRole::Assistant, &extra.text)
                    .await;
                self.dispatch_fanout(&handle, &language).await;
            }
        }

        TurnReport {
            outcome: reply.outcome,
            continued,
            text: reply.text,
        }
    }

    /// System instruction plus the turn-kind-specific tail.
    async fn build_turns(&self, handle: &SessionHandle, kind: TurnKind) -> Vec<ChatMessage> {
        let (system, opener, language) = {
            let session = handle.read().await;
            (
                prompts::system_instruction(&session),
                prompts::opening_line(&session),
                session.language.clone().unwrap_or_default(),
            )
        };

        match kind {
            TurnKind::Start => vec![
                ChatMessage::system(system),
                ChatMessage::user(format!(
                    "{opener} Keep it realistic and concise. Use {language} only."
                )),
            ],
            TurnKind::User | TurnKind::Continue => {
                let mut turns = vec![ChatMessage::system(system)];
                for dto in self.sessions.recent_history(handle, HISTORY_WINDOW).await {
                    turns.push(match dto.role {
                        TurnRole::User => ChatMessage::user(dto.content),
                        TurnRole::Assistant => ChatMessage::assistant(dto.content),
                    });
                }
                if kind == TurnKind::Continue {
                    turns.push(ChatMessage::user(CONTINUE_NUDGE));
                }
                turns
            }
        }
    }

    /// Stream one model reply into the event channel.
    ///
    /// A failure before any content exits the gateway falls back to the
    /// one-shot completion for the same turn sequence; a mid-reply
    /// failure keeps the fragments already delivered. `None` means
    /// neither path produced usable text.
    async fn run_model_turn(
        &self,
        turns: Vec<ChatMessage>,
        tx: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Option<ModelReply> {
        let mut stream = match self.llm.stream_complete(turns.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Stream open failed, falling back to one-shot");
                return self.fallback_one_shot(turns, tx).await;
            }
        };

        let mut filter = MarkerFilter::new();
        let mut interrupted = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if let Some(prefix) = filter.push(&fragment) {
                        let _ = tx.unbounded_send(TurnEvent::Chunk(prefix));
                    }
                }
                Err(e) => {
                    if filter.is_empty() {
                        tracing::warn!(error = %e, "Stream failed before content, falling back to one-shot");
                        return self.fallback_one_shot(turns, tx).await;
                    }
                    tracing::warn!(error = %e, "Stream interrupted mid-reply, keeping partial text");
                    interrupted = true;
                    break;
                }
            }
        }

        let (text, tail, wants_continuation) = filter.finish();
        if !tail.is_empty() {
            let _ = tx.unbounded_send(TurnEvent::Chunk(tail));
        }
        if text.trim().is_empty() {
            tracing::warn!("Stream produced an empty reply");
            return None;
        }
        Some(ModelReply {
            text,
            // A marker on an interrupted reply is not a clean end signal.
            wants_continuation: wants_continuation && !interrupted,
            outcome: TurnOutcome::Streamed,
        })
    }

    async fn fallback_one_shot(
        &self,
        turns: Vec<ChatMessage>,
        tx: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Option<ModelReply> {
        let reply = match self.llm.complete(turns).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "One-shot fallback failed too");
                return None;
            }
        };
        let (text, wants_continuation) = strip_trailing_marker(&reply);
        if text.trim().is_empty() {
            return None;
        }
        let _ = tx.unbounded_send(TurnEvent::Chunk(text.clone()));
        Some(ModelReply {
            text,
            wants_continuation,
            outcome: TurnOutcome::StreamedWithFallback,
        })
    }

    /// Spawn the two post-persist evaluations. Each runs independently,
    /// writes its verdict back into the session, and swallows its own
    /// failures.
    async fn dispatch_fanout(&self, handle: &SessionHandle, language: &str) {
        let (user_message, previous_assistant, task_input) = {
            let session = handle.read().await;
            let user_idx = session
                .messages
                .iter()
                .rposition(|m| m.role == TurnRole::User);
            let user_message = user_idx.map(|i| session.messages[i].content.clone());
            let previous_assistant = user_idx.and_then(|i| {
                session.messages[..i]
                    .iter()
                    .rev()
                    .find(|m| m.role == TurnRole::Assistant)
                    .map(|m| m.content.clone())
            });
            let task_input = match session.task.as_ref().filter(|_| !session.task_completed) {
                Some(task) => Some(CheckTaskInput {
                    task: task.clone(),
                    language: language.to_string(),
                    scenario_title: Some(prompts::scenario_description(&session)),
                    role_guide: Some(prompts::role_guide(&session)),
                    messages: session.messages.iter().map(Message::to_dto).collect(),
                }),
                None => None,
            };
            (user_message, previous_assistant, task_input)
        };

        if let Some(user_message) = user_message {
            let feedback = self.feedback.clone();
            let handle = handle.clone();
            let language = language.to_string();
            tokio::spawn(async move {
                let verdict = feedback
                    .execute(&language, &user_message, previous_assistant.as_deref())
                    .await;
                handle.write().await.last_feedback = Some(verdict);
            });
        }

        if let Some(input) = task_input {
            let task_check = self.task_check.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                if task_check.execute(input).await {
                    handle.write().await.task_completed = true;
                }
            });
        }
    }
}

struct ModelReply {
    text: String,
    wants_continuation: bool,
    outcome: TurnOutcome,
}

/// Fold the request's context fields into the session under one write
/// lock. Returns the session id and the post-merge language.
async fn merge_context(
    handle: &SessionHandle,
    request: &ChatTurnRequest,
) -> (String, Option<String>) {
    let mut session = handle.write().await;

    if let Some(language) = request.language.as_deref() {
        if is_plausible_language(language) {
            session.language = Some(language.trim().to_string());
        }
    }
    if let Some(preset) = request
        .scenario_preset
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        session.scenario_preset = preset.to_string();
    }
    if let Some(custom) = request.scenario_custom.as_deref() {
        session.scenario_custom = custom.trim().to_string();
    }
    if let Some(role) = request.scenario_role.as_deref() {
        session.scenario_role = role.trim().to_string();
    }
    if let Some(start) = request.scenario_start.as_deref() {
        session.scenario_start = start.trim().to_string();
    }
    if let Some(task) = request.task.as_deref() {
        let task = task.trim();
        let new_task = (!task.is_empty()).then(|| task.to_string());
        if new_task != session.task {
            session.task = new_task;
            session.task_completed = false;
        }
    }
    if let Some(difficulty) = request.difficulty.as_ref() {
        session.difficulty = Difficulty::coerce(difficulty);
    }

    // A client transcript longer than ours means this process lost the
    // session (restart). Adopt the client's copy so the scene resumes
    // where it left off.
    if request.messages.len() > session.messages.len() {
        let now = Utc::now();
        session.messages = request
            .messages
            .iter()
            .map(|dto| Message {
                role: dto.role,
                content: dto.content.clone(),
                timestamp: now,
            })
            .collect();
        if session.messages.len() > MAX_MESSAGES {
            let overflow = session.messages.len() - MAX_MESSAGES;
            session.messages.drain(..overflow);
        }
    }

    (session.id.clone(), session.language.clone())
}

/// True when the client's own transcript already ends with this exact
/// user text, meaning the client recorded it before retrying the call.
fn client_already_sent(request: &ChatTurnRequest, message: &str) -> bool {
    request
        .messages
        .last()
        .is_some_and(|last| last.role == TurnRole::User && last.content.trim() == message)
}

fn strip_trailing_marker(reply: &str) -> (String, bool) {
    let trimmed = reply.trim_end();
    match trimmed.strip_suffix(CONTINUE_MARKER) {
        Some(body) => (body.trim_end().to_string(), true),
        None => (reply.to_string(), false),
    }
}

/// Incremental filter that withholds the tail of the reply so a trailing
/// continuation marker is stripped before release, while everything
/// earlier streams through unchanged.
struct MarkerFilter {
    buffer: String,
    released: usize,
}

impl MarkerFilter {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            released: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Absorb one fragment and release any prefix that is safely beyond
    /// the holdback window.
    fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);
        if self.buffer.len() <= self.released + MARKER_HOLDBACK {
            return None;
        }
        let mut cut = self.buffer.len() - MARKER_HOLDBACK;
        while !self.buffer.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut <= self.released {
            return None;
        }
        let out = self.buffer[self.released..cut].to_string();
        self.released = cut;
        Some(out)
    }

    /// Final text (marker-stripped), the yet-unreleased tail of it, and
    /// whether the reply ended with the continuation marker.
    fn finish(self) -> (String, String, bool) {
        let (mut text, wants_continuation) = strip_trailing_marker(&self.buffer);
        // The trim must not reach back into bytes the client already saw,
        // or the recorded text and the streamed text would diverge.
        if text.len() < self.released {
            text = self.buffer[..self.released].to_string();
        }
        let tail = if text.len() > self.released {
            text[self.released..].to_string()
        } else {
            String::new()
        };
        (text, tail, wants_continuation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{LlmError, MockCompletionPort};
    use futures_util::stream;
    use parley_shared::TurnDto;

    fn orchestrator(mock: MockCompletionPort) -> (ChatTurn, Arc<SessionStore>) {
        let sessions = Arc::new(SessionStore::new());
        let llm: Arc<dyn CompletionPort> = Arc::new(mock);
        let chat = ChatTurn::new(
            sessions.clone(),
            Arc::new(RateLimiter::new()),
            llm.clone(),
            Arc::new(EvaluateFeedback::new(llm.clone())),
            Arc::new(CheckTaskCompletion::new(llm)),
        );
        (chat, sessions)
    }

    fn request(message: &str) -> ChatTurnRequest {
        ChatTurnRequest {
            message: Some(message.to_string()),
            language: Some("French".to_string()),
            ..ChatTurnRequest::default()
        }
    }

    fn input(request: ChatTurnRequest) -> ChatTurnInput {
        ChatTurnInput {
            client_ip: "10.0.0.1".to_string(),
            request,
        }
    }

    async fn drain(mut turn: ChatTurnStream) -> (String, Vec<TurnEvent>, TurnReport) {
        let mut text = String::new();
        let mut events = Vec::new();
        while let Some(event) = turn.events.next().await {
            if let TurnEvent::Chunk(chunk) = &event {
                text.push_str(chunk);
            }
            events.push(event);
        }
        let report = turn.report.await.unwrap();
        (text, events, report)
    }

    fn scripted_stream(fragments: Vec<Result<&'static str, LlmError>>) -> MockCompletionPort {
        let mut mock = MockCompletionPort::new();
        mock.expect_stream_complete().returning(move |_| {
            let items: Vec<_> = fragments
                .iter()
                .map(|r| match r {
                    Ok(s) => Ok((*s).to_string()),
                    Err(_) => Err(LlmError::StreamInterrupted("lost".into())),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        });
        // Background evaluators share the port; keep them satisfied.
        mock.expect_complete()
            .returning(|_| Ok(r#"{"status":"ok","corrected":""}"#.to_string()));
        mock
    }

    #[tokio::test]
    async fn user_turn_streams_and_persists_reply() {
        let (chat, sessions) = orchestrator(scripted_stream(vec![
            Ok("Bonjour ! "),
            Ok("Que puis-je vous servir aujourd'hui ?"),
        ]));

        let turn = chat.execute(input(request("Bonjour"))).await.unwrap();
        let session_id = turn.session_id.clone();
        let (text, _, report) = drain(turn).await;

        assert_eq!(text, "Bonjour ! Que puis-je vous servir aujourd'hui ?");
        assert_eq!(report.outcome, TurnOutcome::Streamed);
        assert!(!report.continued);

        let handle = sessions.get(&session_id).unwrap();
        let session = handle.read().await;
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, TurnRole::User);
        assert_eq!(session.messages[0].content, "Bonjour");
        assert_eq!(session.messages[1].role, TurnRole::Assistant);
        assert_eq!(session.messages[1].content, text);
    }

    #[tokio::test]
    async fn start_turn_records_only_the_opening_line() {
        let (chat, sessions) =
            orchestrator(scripted_stream(vec![Ok("Bonjour, bienvenue au café !")]));

        let mut req = request("");
        req.message = None;
        req.kind = TurnKind::Start;
        let turn = chat.execute(input(req)).await.unwrap();
        let session_id = turn.session_id.clone();
        let (text, _, report) = drain(turn).await;

        assert_eq!(report.outcome, TurnOutcome::Streamed);
        let handle = sessions.get(&session_id).unwrap();
        let session = handle.read().await;
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, TurnRole::Assistant);
        assert_eq!(session.messages[0].content, text);
    }

    #[tokio::test]
    async fn stream_failure_before_content_falls_back_to_one_shot() {
        let mut mock = MockCompletionPort::new();
        mock.expect_stream_complete()
            .returning(|_| Err(LlmError::RequestFailed("503".into())));
        mock.expect_complete()
            .returning(|_| Ok("Bonjour, un café ?".to_string()));
        let (chat, sessions) = orchestrator(mock);

        let turn = chat.execute(input(request("Bonjour"))).await.unwrap();
        let session_id = turn.session_id.clone();
        let (text, _, report) = drain(turn).await;

        assert_eq!(text, "Bonjour, un café ?");
        assert_eq!(report.outcome, TurnOutcome::StreamedWithFallback);
        let handle = sessions.get(&session_id).unwrap();
        assert_eq!(handle.read().await.messages[1].content, "Bonjour, un café ?");
    }

    #[tokio::test]
    async fn error_on_first_stream_item_falls_back_to_one_shot() {
        // The stream opens fine but its first item is already an error.
        let mut mock = MockCompletionPort::new();
        mock.expect_stream_complete().returning(|_| {
            Ok(stream::iter(vec![Err(LlmError::StreamInterrupted("reset".into()))]).boxed())
        });
        mock.expect_complete()
            .returning(|_| Ok("Bonjour, un café ?".to_string()));
        let (chat, sessions) = orchestrator(mock);

        let turn = chat.execute(input(request("Bonjour"))).await.unwrap();
        let session_id = turn.session_id.clone();
        let (text, _, report) = drain(turn).await;

        assert_eq!(text, "Bonjour, un café ?");
        assert_eq!(report.outcome, TurnOutcome::StreamedWithFallback);
        let handle = sessions.get(&session_id).unwrap();
        assert_eq!(handle.read().await.messages[1].content, "Bonjour, un café ?");
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text() {
        let (chat, sessions) = orchestrator(scripted_stream(vec![
            Ok("Bonjour, asseyez-vous je vous prie, je reviens dans un instant "),
            Err(LlmError::StreamInterrupted("lost".into())),
        ]));

        let turn = chat.execute(input(request("Bonjour"))).await.unwrap();
        let session_id = turn.session_id.clone();
        let (text, _, report) = drain(turn).await;

        assert!(text.starts_with("Bonjour, asseyez-vous"));
        assert_eq!(report.outcome, TurnOutcome::Streamed);
        let handle = sessions.get(&session_id).unwrap();
        assert_eq!(handle.read().await.messages[1].content, text);
    }

    #[tokio::test]
    async fn both_paths_failing_records_the_apology() {
        let mut mock = MockCompletionPort::new();
        mock.expect_stream_complete()
            .returning(|_| Err(LlmError::RequestFailed("503".into())));
        mock.expect_complete()
            .returning(|_| Err(LlmError::RequestFailed("503".into())));
        let (chat, sessions) = orchestrator(mock);

        let turn = chat.execute(input(request("Bonjour"))).await.unwrap();
        let session_id = turn.session_id.clone();
        let (_, events, report) = drain(turn).await;

        assert_eq!(report.outcome, TurnOutcome::Failed);
        assert!(events.contains(&TurnEvent::Failed {
            message: FALLBACK_APOLOGY.to_string()
        }));
        let handle = sessions.get(&session_id).unwrap();
        assert_eq!(handle.read().await.messages[1].content, FALLBACK_APOLOGY);
    }

    #[tokio::test]
    async fn trailing_marker_triggers_exactly_one_continuation() {
        let mut mock = MockCompletionPort::new();
        // Both replies end with the marker; the cap must stop the chain
        // after the first continuation.
        let mut replies = vec![
            vec!["Voilà votre café. ", "Je reviens tout de suite. [[NEXT]]"],
            vec!["Et voici un verre d'eau. [[NEXT]]"],
        ]
        .into_iter();
        mock.expect_stream_complete().times(2).returning(move |_| {
            let fragments = replies.next().unwrap();
            Ok(stream::iter(fragments.into_iter().map(|s| Ok(s.to_string()))).boxed())
        });
        mock.expect_complete()
            .returning(|_| Ok(r#"{"status":"ok","corrected":""}"#.to_string()));
        let (chat, sessions) = orchestrator(mock);

        let turn = chat.execute(input(request("Un café"))).await.unwrap();
        let session_id = turn.session_id.clone();
        let (text, _, report) = drain(turn).await;

        assert!(report.continued);
        assert!(!text.contains("[[NEXT]]"));
        assert!(text.contains("Je reviens tout de suite."));
        assert!(text.contains("Et voici un verre d'eau."));

        let handle = sessions.get(&session_id).unwrap();
        let session = handle.read().await;
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[1].content, "Voilà votre café. Je reviens tout de suite.");
        assert_eq!(session.messages[2].content, "Et voici un verre d'eau.");
    }

    #[tokio::test]
    async fn empty_user_message_is_rejected() {
        let (chat, _) = orchestrator(MockCompletionPort::new());
        let err = chat.execute(input(request("   "))).await.err().unwrap();
        assert!(matches!(err, ChatTurnError::EmptyMessage));
    }

    #[tokio::test]
    async fn turn_without_language_is_rejected() {
        let (chat, _) = orchestrator(MockCompletionPort::new());
        let mut req = request("Bonjour");
        req.language = None;
        let err = chat.execute(input(req)).await.err().unwrap();
        assert!(matches!(err, ChatTurnError::LanguageNotSet));
    }

    #[tokio::test]
    async fn duplicate_append_guard_skips_retried_message() {
        let (chat, sessions) = orchestrator(scripted_stream(vec![Ok("Bien sûr !")]));

        let mut req = request("Un café, s'il vous plaît");
        req.messages = vec![TurnDto {
            role: TurnRole::User,
            content: "Un café, s'il vous plaît".to_string(),
        }];
        let turn = chat.execute(input(req)).await.unwrap();
        let session_id = turn.session_id.clone();
        drain(turn).await;

        let handle = sessions.get(&session_id).unwrap();
        let session = handle.read().await;
        // The client transcript (one user turn) was adopted; the retried
        // message was not appended a second time.
        let user_turns = session
            .messages
            .iter()
            .filter(|m| m.role == TurnRole::User)
            .count();
        assert_eq!(user_turns, 1);
    }

    #[tokio::test]
    async fn longer_client_transcript_is_adopted() {
        let (chat, sessions) = orchestrator(scripted_stream(vec![Ok("On disait donc ?")]));

        let mut req = request("Oui");
        req.session_id = Some("sess_restarted".to_string());
        req.messages = vec![
            TurnDto {
                role: TurnRole::Assistant,
                content: "Bonjour !".to_string(),
            },
            TurnDto {
                role: TurnRole::User,
                content: "Salut".to_string(),
            },
        ];
        let turn = chat.execute(input(req)).await.unwrap();
        drain(turn).await;

        let handle = sessions.get("sess_restarted").unwrap();
        let session = handle.read().await;
        // Adopted transcript + new user turn + new assistant reply.
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[0].content, "Bonjour !");
        assert_eq!(session.messages[3].content, "On disait donc ?");
    }

    #[test]
    fn marker_filter_withholds_and_strips_trailing_marker() {
        let mut filter = MarkerFilter::new();
        let mut released = String::new();
        for fragment in ["Voilà ", "votre café. ", "[[NE", "XT]]"] {
            if let Some(prefix) = filter.push(fragment) {
                released.push_str(&prefix);
            }
        }
        assert!(!released.contains("[[NEXT]]"));
        let (text, tail, wants) = filter.finish();
        assert!(wants);
        assert_eq!(text, "Voilà votre café.");
        assert_eq!(format!("{released}{tail}"), text);
    }

    #[test]
    fn marker_filter_passes_plain_text_through() {
        let mut filter = MarkerFilter::new();
        let mut released = String::new();
        for fragment in ["Bonjour, ", "que puis-je ", "vous servir ?"] {
            if let Some(prefix) = filter.push(fragment) {
                released.push_str(&prefix);
            }
        }
        let (text, tail, wants) = filter.finish();
        assert!(!wants);
        assert_eq!(format!("{released}{tail}"), text);
        assert_eq!(text, "Bonjour, que puis-je vous servir ?");
    }

    #[test]
    fn marker_filter_release_respects_char_boundaries() {
        let mut filter = MarkerFilter::new();
        let mut released = String::new();
        // Multi-byte content long enough to force releases mid-buffer.
        for fragment in ["héhéhéhéhé", "héhéhéhéhé", "héhéhéhéhé"] {
            if let Some(prefix) = filter.push(fragment) {
                released.push_str(&prefix);
            }
        }
        let (text, tail, wants) = filter.finish();
        assert!(!wants);
        assert_eq!(format!("{released}{tail}"), text);
    }

    #[test]
    fn marker_filter_records_whitespace_already_streamed() {
        let mut filter = MarkerFilter::new();
        let mut released = String::new();
        // Enough whitespace before the marker that some of it escapes
        // the holdback window and reaches the client.
        for fragment in ["Voilà votre café.", "          ", "[[NEXT]]"] {
            if let Some(prefix) = filter.push(fragment) {
                released.push_str(&prefix);
            }
        }
        let (text, tail, wants) = filter.finish();
        assert!(wants);
        assert_eq!(format!("{released}{tail}"), text);
        assert!(!text.contains("[[NEXT]]"));
        assert!(text.starts_with("Voilà votre café."));
    }

    #[test]
    fn strip_trailing_marker_ignores_mid_text_occurrence() {
        let (text, wants) = strip_trailing_marker("On dit [[NEXT]] pour continuer.");
        assert!(!wants);
        assert_eq!(text, "On dit [[NEXT]] pour continuer.");
    }
}
