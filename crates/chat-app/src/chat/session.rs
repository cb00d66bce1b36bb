use std::sync::Arc;

use aichat_llm::{
    ChatHandle, ConversationProvider, DEFAULT_GEMINI_MODEL, GenerationConfig, SafetySetting,
    StartChatRequest, default_safety_settings,
};
use snafu::ensure;
use tokio::sync::Mutex;

use super::error::{
    EmptyMessageSnafu, SendInProgressSnafu, SessionError, SessionResult, SupersededSnafu,
};
use super::message::{Conversation, Turn, TurnStatus};

/// Failure reason recorded on a user turn whose reply arrived for an older generation.
pub const SUPERSEDED_TURN_REASON: &str = "superseded";

/// Lifecycle of one chat screen activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Closed,
}

/// Counter identifying the current dialogue context.
///
/// Bumped by every `initialize` and by `close`, so completions tagged with an
/// older value can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionGeneration(pub u64);

impl SessionGeneration {
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Model parameters used whenever a dialogue context is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model_id: String,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            generation_config: GenerationConfig::default(),
            safety_settings: default_safety_settings(),
        }
    }
}

struct SessionInner {
    state: SessionState,
    conversation: Conversation,
    handle: Option<Arc<dyn ChatHandle>>,
    generation: SessionGeneration,
    error: Option<String>,
    input: String,
}

impl SessionInner {
    fn surface(&mut self, error: &SessionError) {
        self.error = Some(error.user_message().to_string());
    }
}

/// Owns the conversation of one chat screen and its dialogue context.
///
/// State lives behind an async mutex that is never held across a provider call.
/// A second single-slot mutex keeps at most one send in flight.
pub struct SessionManager {
    provider: Arc<dyn ConversationProvider>,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
    send_slot: Mutex<()>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn ConversationProvider>, config: SessionConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                conversation: Conversation::new(),
                handle: None,
                generation: SessionGeneration::default(),
                error: None,
                input: String::new(),
            }),
            send_slot: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Opens a fresh dialogue context seeded with the settled turns of the conversation.
    ///
    /// Any previous handle is discarded first; replies still in flight against it are dropped.
    pub async fn initialize(&self) -> SessionResult<()> {
        let (generation, request) = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Closed {
                let error = SessionError::NotReady {
                    stage: "initialize-closed",
                    state: inner.state,
                };
                return Err(error);
            }

            inner.generation = inner.generation.next();
            inner.state = SessionState::Initializing;
            inner.handle = None;

            let request = StartChatRequest::new(self.config.model_id.clone())
                .with_generation_config(self.config.generation_config)
                .with_safety_settings(self.config.safety_settings.clone())
                .with_history(inner.conversation.history());
            (inner.generation, request)
        };

        tracing::debug!(
            provider_id = %self.provider.id(),
            model_id = %request.model_id,
            generation = generation.0,
            history_len = request.history.len(),
            "initializing chat session"
        );
        let result = self.provider.start_chat(request).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::debug!(
                generation = generation.0,
                current_generation = inner.generation.0,
                "discarding stale chat initialization"
            );
            return SupersededSnafu {
                stage: "initialize-complete",
                generation: generation.0,
            }
            .fail();
        }

        match result {
            Ok(handle) => {
                tracing::info!(
                    provider_id = %self.provider.id(),
                    model_id = %handle.model_id(),
                    generation = generation.0,
                    "chat session ready"
                );
                inner.handle = Some(handle);
                inner.state = SessionState::Ready;
                inner.error = None;
                Ok(())
            }
            Err(source) => {
                let error = SessionError::InitializationFailed {
                    stage: "start-chat",
                    source,
                };
                tracing::warn!(
                    provider_id = %self.provider.id(),
                    generation = generation.0,
                    error = %error,
                    "chat initialization failed"
                );
                inner.state = SessionState::Failed;
                inner.surface(&error);
                Err(error)
            }
        }
    }

    /// Sends one user message and appends the assistant reply.
    ///
    /// The user turn is appended before the provider call and stays in the conversation
    /// when the call fails; it is then marked `Failed` and no assistant turn follows.
    pub async fn send(&self, text: impl Into<String>) -> SessionResult<Turn> {
        let text = text.into();
        ensure!(
            !text.trim().is_empty(),
            EmptyMessageSnafu {
                stage: "send-validate",
            }
        );

        let Ok(_slot) = self.send_slot.try_lock() else {
            tracing::debug!("rejecting send while another reply is outstanding");
            return SendInProgressSnafu {
                stage: "send-acquire-slot",
            }
            .fail();
        };

        let (generation, handle, user_turn_id) = {
            let mut inner = self.inner.lock().await;
            let ready = inner.state == SessionState::Ready;
            let Some(handle) = inner.handle.clone().filter(|_| ready) else {
                let error = SessionError::NotReady {
                    stage: "send-precondition",
                    state: inner.state,
                };
                inner.surface(&error);
                return Err(error);
            };

            let user_turn_id = inner.conversation.push_user(text.clone());
            inner.input.clear();
            (inner.generation, handle, user_turn_id)
        };

        let result = handle.send_message(text).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::debug!(
                generation = generation.0,
                current_generation = inner.generation.0,
                turn_id = user_turn_id.0,
                "discarding reply for superseded chat session"
            );
            inner.conversation.settle(
                user_turn_id,
                TurnStatus::Failed(SUPERSEDED_TURN_REASON.to_string()),
            );
            return SupersededSnafu {
                stage: "send-complete",
                generation: generation.0,
            }
            .fail();
        }

        match result {
            Ok(reply) => {
                inner
                    .conversation
                    .settle(user_turn_id, TurnStatus::Answered);
                let turn = inner.conversation.push_assistant(reply).clone();
                inner.error = None;
                tracing::debug!(
                    turn_id = turn.id.0,
                    conversation_len = inner.conversation.len(),
                    "assistant turn appended"
                );
                Ok(turn)
            }
            Err(source) => {
                inner
                    .conversation
                    .settle(user_turn_id, TurnStatus::Failed(source.to_string()));
                let error = SessionError::SendFailed {
                    stage: "send-message",
                    source,
                };
                tracing::warn!(
                    turn_id = user_turn_id.0,
                    error = %error,
                    "send failed; user turn kept"
                );
                inner.surface(&error);
                Err(error)
            }
        }
    }

    /// Ends the screen activation. Late completions are discarded and further
    /// operations fail with `NotReady`.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.generation = inner.generation.next();
        inner.handle = None;
        inner.state = SessionState::Closed;
        tracing::debug!(generation = inner.generation.0, "chat session closed");
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn generation(&self) -> SessionGeneration {
        self.inner.lock().await.generation
    }

    /// Snapshot of the conversation in insertion order.
    pub async fn conversation(&self) -> Vec<Turn> {
        self.inner.lock().await.conversation.turns().to_vec()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.lock().await.error.clone()
    }

    pub async fn input(&self) -> String {
        self.inner.lock().await.input.clone()
    }

    pub async fn set_input(&self, input: impl Into<String>) {
        self.inner.lock().await.input = input.into();
    }

    /// Sends the current input buffer.
    pub async fn send_input(&self) -> SessionResult<Turn> {
        let input = self.input().await;
        self.send(input).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use aichat_llm::{BoxFuture, ProviderError, ProviderResult, Role as ProviderRole};
    use tokio::sync::Notify;

    use super::*;
    use crate::chat::message::Role;

    type Replies = Arc<StdMutex<VecDeque<ProviderResult<String>>>>;

    fn scripted_failure(stage: &'static str) -> ProviderError {
        ProviderError::EmptyResponse {
            stage,
            model_id: "scripted-model".to_string(),
        }
    }

    #[derive(Default)]
    struct ScriptedProvider {
        fail_start: bool,
        replies: Replies,
        gate: Option<Arc<Notify>>,
        starts: AtomicUsize,
        requests: StdMutex<Vec<StartChatRequest>>,
        sent: Arc<StdMutex<Vec<(usize, String)>>>,
    }

    impl ScriptedProvider {
        fn replying(replies: Vec<ProviderResult<String>>) -> Self {
            Self {
                replies: Arc::new(StdMutex::new(replies.into())),
                ..Self::default()
            }
        }

        fn failing_start() -> Self {
            Self {
                fail_start: true,
                ..Self::default()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }
    }

    struct ScriptedHandle {
        index: usize,
        replies: Replies,
        gate: Option<Arc<Notify>>,
        sent: Arc<StdMutex<Vec<(usize, String)>>>,
    }

    impl ChatHandle for ScriptedHandle {
        fn model_id(&self) -> &str {
            "scripted-model"
        }

        fn send_message<'a>(&'a self, text: String) -> BoxFuture<'a, ProviderResult<String>> {
            Box::pin(async move {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                self.sent.lock().unwrap().push((self.index, text.clone()));
                self.replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(format!("echo: {text}")))
            })
        }
    }

    impl ConversationProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn start_chat<'a>(
            &'a self,
            request: StartChatRequest,
        ) -> BoxFuture<'a, ProviderResult<Arc<dyn ChatHandle>>> {
            Box::pin(async move {
                let index = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
                self.requests.lock().unwrap().push(request);
                if self.fail_start {
                    return Err(scripted_failure("scripted-start"));
                }
                let handle: Arc<dyn ChatHandle> = Arc::new(ScriptedHandle {
                    index,
                    replies: Arc::clone(&self.replies),
                    gate: self.gate.clone(),
                    sent: Arc::clone(&self.sent),
                });
                Ok(handle)
            })
        }
    }

    fn manager(provider: Arc<ScriptedProvider>) -> SessionManager {
        SessionManager::new(provider, SessionConfig::default())
    }

    async fn wait_for_turns(manager: &SessionManager, count: usize) {
        while manager.conversation().await.len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn successful_round_trip_appends_user_then_assistant() {
        let provider = Arc::new(ScriptedProvider::replying(vec![Ok("hi there".to_string())]));
        let manager = manager(Arc::clone(&provider));

        manager.initialize().await.unwrap();
        let reply = manager.send("hello").await.unwrap();

        let conversation = manager.conversation().await;
        let shape = conversation
            .iter()
            .map(|turn| (turn.text.as_str(), turn.role))
            .collect::<Vec<_>>();
        assert_eq!(
            shape,
            vec![("hello", Role::User), ("hi there", Role::Assistant)]
        );
        assert_eq!(reply.text, "hi there");
        assert_eq!(conversation[0].status, TurnStatus::Answered);
        assert_eq!(manager.state().await, SessionState::Ready);
        assert_eq!(manager.error().await, None);
    }

    #[tokio::test]
    async fn n_successful_sends_alternate_roles() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = manager(provider);
        manager.initialize().await.unwrap();

        for index in 0..5 {
            manager.send(format!("message {index}")).await.unwrap();
        }

        let conversation = manager.conversation().await;
        assert_eq!(conversation.len(), 10);
        for (index, turn) in conversation.iter().enumerate() {
            let expected = if index % 2 == 0 {
                Role::User
            } else {
                Role::Assistant
            };
            assert_eq!(turn.role, expected);
        }
        assert!(conversation.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[tokio::test]
    async fn initialize_forwards_model_configuration() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = manager(Arc::clone(&provider));

        manager.initialize().await.unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(requests[0].generation_config, GenerationConfig::default());
        assert_eq!(requests[0].safety_settings, default_safety_settings());
        assert!(requests[0].history.is_empty());
    }

    #[tokio::test]
    async fn send_before_initialize_is_rejected_without_changes() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = manager(Arc::clone(&provider));

        let result = manager.send("hello").await;

        assert!(matches!(
            result,
            Err(SessionError::NotReady {
                state: SessionState::Uninitialized,
                ..
            })
        ));
        assert!(manager.conversation().await.is_empty());
        assert_eq!(manager.error().await.as_deref(), Some(NOT_READY));
        assert!(provider.sent.lock().unwrap().is_empty());
    }

    const NOT_READY: &str = crate::chat::error::NOT_READY_MESSAGE;

    #[tokio::test]
    async fn failed_initialize_then_send_reports_not_ready() {
        let provider = Arc::new(ScriptedProvider::failing_start());
        let manager = manager(provider);

        let init = manager.initialize().await;
        assert!(matches!(
            init,
            Err(SessionError::InitializationFailed { .. })
        ));
        assert_eq!(manager.state().await, SessionState::Failed);
        assert_eq!(
            manager.error().await.as_deref(),
            Some(crate::chat::error::INITIALIZATION_FAILED_MESSAGE)
        );

        let result = manager.send("hello").await;

        assert!(matches!(result, Err(SessionError::NotReady { .. })));
        assert!(manager.conversation().await.is_empty());
        assert_eq!(manager.error().await.as_deref(), Some(NOT_READY));
    }

    #[tokio::test]
    async fn provider_failure_keeps_user_turn_and_marks_it_failed() {
        let provider = Arc::new(ScriptedProvider::replying(vec![Err(scripted_failure(
            "scripted-send",
        ))]));
        let manager = manager(provider);
        manager.initialize().await.unwrap();

        let result = manager.send("hello").await;

        assert!(matches!(result, Err(SessionError::SendFailed { .. })));
        let conversation = manager.conversation().await;
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0].role, Role::User);
        assert!(matches!(conversation[0].status, TurnStatus::Failed(_)));
        assert_eq!(
            manager.error().await.as_deref(),
            Some(crate::chat::error::SEND_FAILED_MESSAGE)
        );
        assert_eq!(manager.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn next_success_clears_error_banner() {
        let provider = Arc::new(ScriptedProvider::replying(vec![
            Err(scripted_failure("scripted-send")),
            Ok("back online".to_string()),
        ]));
        let manager = manager(provider);
        manager.initialize().await.unwrap();

        let _ = manager.send("first").await;
        assert!(manager.error().await.is_some());
        manager.send("second").await.unwrap();

        assert_eq!(manager.error().await, None);
        assert_eq!(manager.conversation().await.len(), 3);
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_touching_state() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = manager(provider);
        manager.initialize().await.unwrap();

        let result = manager.send("   ").await;

        assert!(matches!(result, Err(SessionError::EmptyMessage { .. })));
        assert!(manager.conversation().await.is_empty());
        assert_eq!(manager.error().await, None);
    }

    #[tokio::test]
    async fn send_input_clears_the_buffer() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = manager(Arc::clone(&provider));
        manager.initialize().await.unwrap();
        manager.set_input("from the box").await;

        manager.send_input().await.unwrap();

        assert_eq!(manager.input().await, "");
        assert_eq!(
            provider.sent.lock().unwrap().as_slice(),
            &[(1, "from the box".to_string())]
        );
    }

    #[tokio::test]
    async fn overlapping_send_is_rejected() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(ScriptedProvider::gated(Arc::clone(&gate)));
        let manager = Arc::new(manager(provider));
        manager.initialize().await.unwrap();

        let first = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.send("first").await }
        });
        wait_for_turns(&manager, 1).await;

        let second = manager.send("second").await;
        assert!(matches!(second, Err(SessionError::SendInProgress { .. })));
        assert_eq!(manager.conversation().await.len(), 1);

        gate.notify_one();
        first.await.unwrap().unwrap();

        let conversation = manager.conversation().await;
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].text, "first");
    }

    #[tokio::test]
    async fn reply_after_reinitialize_is_discarded() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(ScriptedProvider::gated(Arc::clone(&gate)));
        let manager = Arc::new(manager(Arc::clone(&provider)));
        manager.initialize().await.unwrap();

        let pending = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.send("hello").await }
        });
        wait_for_turns(&manager, 1).await;

        manager.initialize().await.unwrap();
        gate.notify_one();
        let result = pending.await.unwrap();

        assert!(matches!(
            result,
            Err(SessionError::Superseded { generation: 1, .. })
        ));
        let conversation = manager.conversation().await;
        assert_eq!(conversation.len(), 1);
        assert_eq!(
            conversation[0].status,
            TurnStatus::Failed(SUPERSEDED_TURN_REASON.to_string())
        );
        assert_eq!(manager.generation().await, SessionGeneration(2));
        assert_eq!(provider.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reinitialize_routes_sends_through_the_new_handle() {
        let provider = Arc::new(ScriptedProvider::default());
        let manager = manager(Arc::clone(&provider));
        manager.initialize().await.unwrap();
        manager.send("before").await.unwrap();

        manager.initialize().await.unwrap();
        manager.send("after").await.unwrap();

        let sent = provider.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![(1, "before".to_string()), (2, "after".to_string())]
        );
        let requests = provider.requests.lock().unwrap();
        assert_eq!(
            requests[1].history.iter().map(|message| message.role).collect::<Vec<_>>(),
            vec![ProviderRole::User, ProviderRole::Assistant]
        );
    }

    #[tokio::test]
    async fn close_discards_in_flight_reply_and_blocks_further_sends() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(ScriptedProvider::gated(Arc::clone(&gate)));
        let manager = Arc::new(manager(provider));
        manager.initialize().await.unwrap();

        let pending = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.send("hello").await }
        });
        wait_for_turns(&manager, 1).await;

        manager.close().await;
        gate.notify_one();

        assert!(matches!(
            pending.await.unwrap(),
            Err(SessionError::Superseded { .. })
        ));
        assert!(matches!(
            manager.send("again").await,
            Err(SessionError::NotReady {
                state: SessionState::Closed,
                ..
            })
        ));
        assert!(matches!(
            manager.initialize().await,
            Err(SessionError::NotReady { .. })
        ));
        let conversation = manager.conversation().await;
        assert_eq!(conversation.len(), 1);
        assert!(matches!(conversation[0].status, TurnStatus::Failed(_)));
    }
}
