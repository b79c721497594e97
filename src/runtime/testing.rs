//! Mock implementations for testing
//!
//! These mocks enable end-to-end turn testing without real I/O.

use super::traits::*;
use super::{RuntimeManager, RuntimeSettings, SseEvent, TurnError, TurnReport};
use crate::auth::{AuthError, SignInCard, TokenLookup, TokenProvider};
use crate::dialog::{ConversationRef, DialogStack, InboundEvent, TokenResponse, TurnPayload};
use crate::graph::{GraphApi, GraphError, MailSummary, UserProfile};
use async_trait::async_trait;
use chrono::TimeDelta;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Mock Token Provider
// ============================================================================

#[derive(Default)]
struct MockTokenState {
    /// Token the service holds for the user after a completed sign-in
    stored: Option<TokenResponse>,
    declined: bool,
    failing: bool,
    magic_codes: HashMap<String, TokenResponse>,
    calls: Vec<String>,
}

/// Token provider that hands out sign-in cards until a sign-in is completed
#[derive(Default)]
pub struct MockTokenProvider {
    state: Mutex<MockTokenState>,
}

#[allow(dead_code)]
impl MockTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request is declined outright
    pub fn declining(self) -> Self {
        self.state.lock().unwrap().declined = true;
        self
    }

    /// Every request fails with a server error
    pub fn failing(self) -> Self {
        self.state.lock().unwrap().failing = true;
        self
    }

    pub fn with_magic_code(self, code: &str, token: TokenResponse) -> Self {
        self.state
            .lock()
            .unwrap()
            .magic_codes
            .insert(code.to_string(), token);
        self
    }

    /// The user finished signing in out of band
    pub fn complete_sign_in(&self, token: TokenResponse) {
        self.state.lock().unwrap().stored = Some(token);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn request_token(
        &self,
        _user: &ConversationRef,
        connection_name: &str,
    ) -> Result<TokenLookup, AuthError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("request_token".to_string());
        if state.failing {
            return Err(AuthError::server_error("token service unavailable"));
        }
        if state.declined {
            return Ok(TokenLookup::Declined);
        }
        Ok(match &state.stored {
            Some(token) => TokenLookup::Token(token.clone()),
            None => TokenLookup::SignIn(SignInCard {
                text: "Please sign in".to_string(),
                sign_in_link: "https://sign-in.example/start".to_string(),
                connection_name: connection_name.to_string(),
            }),
        })
    }

    async fn exchange_magic_code(
        &self,
        _user: &ConversationRef,
        _connection_name: &str,
        code: &str,
    ) -> Result<Option<TokenResponse>, AuthError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("exchange_magic_code:{code}"));
        let token = state.magic_codes.get(code).cloned();
        if let Some(token) = &token {
            state.stored = Some(token.clone());
        }
        Ok(token)
    }

    async fn sign_out(
        &self,
        _user: &ConversationRef,
        _connection_name: &str,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("sign_out".to_string());
        state.stored = None;
        Ok(())
    }
}

// ============================================================================
// Mock Graph API
// ============================================================================

/// Graph stand-in that records calls
pub struct MockGraphApi {
    display_name: String,
    mail: Vec<MailSummary>,
    failing: bool,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockGraphApi {
    pub fn new() -> Self {
        Self {
            display_name: "Test User".to_string(),
            mail: Vec::new(),
            failing: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_profile(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_mail(mut self, mail: Vec<MailSummary>) -> Self {
        self.mail = mail;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), GraphError> {
        self.calls.lock().unwrap().push(call);
        if self.failing {
            return Err(GraphError::Api {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockGraphApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphApi for MockGraphApi {
    async fn get_self(&self, _token: &str) -> Result<UserProfile, GraphError> {
        self.record("get_self".to_string())?;
        Ok(UserProfile {
            display_name: self.display_name.clone(),
            mail: None,
            user_principal_name: None,
        })
    }

    async fn send_mail(&self, _token: &str, recipient: &str) -> Result<(), GraphError> {
        self.record(format!("send_mail:{recipient}"))
    }

    async fn list_recent_mail(&self, _token: &str) -> Result<Vec<MailSummary>, GraphError> {
        self.record("list_recent_mail".to_string())?;
        Ok(self.mail.clone())
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// State store keeping the serialized stacks, exactly as they would be persisted
#[derive(Default)]
pub struct InMemoryStateStore {
    stacks: Mutex<HashMap<String, String>>,
}

#[allow(dead_code)]
impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted JSON for a conversation
    pub fn raw(&self, conv_id: &str) -> Option<String> {
        self.stacks.lock().unwrap().get(conv_id).cloned()
    }

    pub fn put_raw(&self, conv_id: &str, json: &str) {
        self.stacks
            .lock()
            .unwrap()
            .insert(conv_id.to_string(), json.to_string());
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_stack(&self, conv_id: &str) -> Result<DialogStack, String> {
        match self.raw(conv_id) {
            Some(json) => serde_json::from_str(&json).map_err(|e| e.to_string()),
            None => Ok(DialogStack::new()),
        }
    }

    async fn save_stack(&self, conv_id: &str, stack: &DialogStack) -> Result<(), String> {
        let json = serde_json::to_string(stack).map_err(|e| e.to_string())?;
        self.put_raw(conv_id, &json);
        Ok(())
    }

    async fn clear_stack(&self, conv_id: &str) -> Result<(), String> {
        self.stacks.lock().unwrap().remove(conv_id);
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<String>, String> {
        Ok(self.stacks.lock().unwrap().keys().cloned().collect())
    }
}

// ============================================================================
// Test Bot Harness
// ============================================================================

pub type TestManager<S> = RuntimeManager<S, Arc<MockTokenProvider>, Arc<MockGraphApi>>;

pub fn test_settings() -> RuntimeSettings {
    RuntimeSettings {
        connection_name: "graph".to_string(),
        sign_in_timeout: TimeDelta::seconds(300),
    }
}

/// One conversation driven against mock collaborators
pub struct TestBot<S: StateStore + Clone + 'static> {
    pub manager: TestManager<S>,
    pub storage: S,
    pub tokens: Arc<MockTokenProvider>,
    pub graph: Arc<MockGraphApi>,
    pub user: ConversationRef,
}

impl TestBot<Arc<InMemoryStateStore>> {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestBotBuilder {
        TestBotBuilder::default()
    }
}

#[derive(Default)]
pub struct TestBotBuilder {
    tokens: Option<MockTokenProvider>,
    graph: Option<MockGraphApi>,
    sign_in_timeout: Option<TimeDelta>,
}

impl TestBotBuilder {
    pub fn tokens(mut self, tokens: MockTokenProvider) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn graph(mut self, graph: MockGraphApi) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn sign_in_timeout(mut self, timeout: TimeDelta) -> Self {
        self.sign_in_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TestBot<Arc<InMemoryStateStore>> {
        self.build_with(Arc::new(InMemoryStateStore::new()))
    }

    pub fn build_with<S: StateStore + Clone + 'static>(self, storage: S) -> TestBot<S> {
        let tokens = Arc::new(self.tokens.unwrap_or_default());
        let graph = Arc::new(self.graph.unwrap_or_default());
        let mut settings = test_settings();
        if let Some(timeout) = self.sign_in_timeout {
            settings.sign_in_timeout = timeout;
        }
        TestBot {
            manager: RuntimeManager::new(
                storage.clone(),
                Arc::clone(&tokens),
                Arc::clone(&graph),
                settings,
            ),
            storage,
            tokens,
            graph,
            user: ConversationRef::new("conv-1", "user-1", "test"),
        }
    }
}

#[allow(dead_code)]
impl<S: StateStore + Clone + 'static> TestBot<S> {
    pub async fn send(&self, payload: TurnPayload) -> Result<TurnReport, TurnError> {
        self.manager
            .submit(InboundEvent {
                conversation: self.user.clone(),
                payload,
            })
            .await
    }

    pub async fn say(&self, text: &str) -> TurnReport {
        self.send(TurnPayload::Message {
            text: text.to_string(),
        })
        .await
        .unwrap()
    }

    /// Finish signing in and deliver the token callback
    pub async fn sign_in(&self, token: &str) -> TurnReport {
        let token = TokenResponse::new(token, "graph");
        self.tokens.complete_sign_in(token.clone());
        self.send(TurnPayload::AuthCallback { token }).await.unwrap()
    }

    pub async fn stack(&self) -> DialogStack {
        self.manager.load_stack(&self.user.conversation_id).await.unwrap()
    }
}

/// Collect broadcast events until a turn completes the flow
pub async fn wait_for_completion(
    rx: &mut broadcast::Receiver<SseEvent>,
    timeout: Duration,
) -> Option<Vec<SseEvent>> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv()).await.ok()?.ok()?;
        let done = matches!(
            event,
            SseEvent::TurnComplete {
                status: super::TurnStatus::Completed,
                ..
            }
        );
        seen.push(event);
        if done {
            return Some(seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::dialog::main_flow::{
        COMMAND_PROMPT, LOGGED_IN, LOGIN_FAILED, PROCESS_LOGIN_FAILED, THANK_YOU,
        VIEW_TOKEN_PROMPT,
    };
    use crate::dialog::{FlowId, FrameValues, StackFrame, StepExecutionError};
    use crate::runtime::executor::{SIGNED_OUT, WELCOME};
    use crate::runtime::{OutboundMessage, TurnStatus};

    /// Scenario A: "hello" suspends on sign-in, the callback logs in and asks
    async fn logged_in_bot() -> TestBot<Arc<InMemoryStateStore>> {
        let bot = TestBot::new();

        let report = bot.say("hello").await;
        assert!(report.sign_in_card().is_some());
        assert!(report.texts().is_empty());
        assert_eq!(
            report.status,
            TurnStatus::Suspended {
                depth: 2,
                active_flow: FlowId::OauthPrompt,
                step_index: 1
            }
        );

        let report = bot.sign_in("T").await;
        assert_eq!(report.texts(), vec![LOGGED_IN, VIEW_TOKEN_PROMPT]);
        assert_eq!(
            report.status,
            TurnStatus::Suspended {
                depth: 2,
                active_flow: FlowId::ConfirmPrompt,
                step_index: 1
            }
        );
        bot
    }

    #[tokio::test]
    async fn test_scenario_a_sign_in_then_confirm() {
        let bot = logged_in_bot().await;
        let stack = bot.stack().await;
        assert_eq!(stack.frames()[0].flow, FlowId::Main);
        assert_eq!(stack.frames()[0].step_index, 2);
    }

    #[tokio::test]
    async fn test_scenario_b_no_completes() {
        let bot = logged_in_bot().await;

        let report = bot.say("no").await;
        assert_eq!(report.texts(), vec![THANK_YOU]);
        assert_eq!(report.status, TurnStatus::Completed);
        assert!(bot.stack().await.is_empty());
        assert!(bot.storage.raw("conv-1").is_none());
    }

    #[tokio::test]
    async fn test_scenario_c_and_d_view_token_then_command() {
        let bot = TestBot::builder()
            .graph(MockGraphApi::new().with_mail(vec![MailSummary {
                from: "Ada".to_string(),
                subject: "Hi".to_string(),
            }]))
            .build();
        bot.say("hello").await;
        bot.sign_in("T").await;

        // C: re-authentication answers from the token cache on the same turn
        let report = bot.say("yes").await;
        assert_eq!(
            report.texts(),
            vec![THANK_YOU, "Here is your token T", COMMAND_PROMPT]
        );
        assert_eq!(
            report.status,
            TurnStatus::Suspended {
                depth: 2,
                active_flow: FlowId::TextPrompt,
                step_index: 1
            }
        );

        // D
        let report = bot.say("recent").await;
        assert_eq!(
            report.texts(),
            vec!["Here are your recent messages:\n- Hi (from Ada)"]
        );
        assert_eq!(report.status, TurnStatus::Completed);
        assert_eq!(bot.graph.calls(), vec!["list_recent_mail".to_string()]);
        assert!(bot.stack().await.is_empty());

        let requests = bot
            .tokens
            .calls()
            .iter()
            .filter(|c| *c == "request_token")
            .count();
        assert_eq!(requests, 3, "one sign-in per token-dependent step");
    }

    #[tokio::test]
    async fn test_scenario_d_completes_when_graph_fails() {
        let bot = TestBot::builder().graph(MockGraphApi::new().failing()).build();
        bot.say("hello").await;
        bot.sign_in("T").await;
        bot.say("yes").await;

        let report = bot.say("me").await;
        assert_eq!(report.status, TurnStatus::Completed);
        assert!(report.texts()[0].starts_with("Sorry, I couldn't look up your profile"));
    }

    #[tokio::test]
    async fn test_send_and_other_commands() {
        let bot = TestBot::new();
        bot.say("hello").await;
        bot.sign_in("T").await;
        bot.say("yes").await;
        let report = bot.say("send someone@example.com").await;
        assert_eq!(
            report.texts(),
            vec!["I sent a message to 'someone@example.com' from your account."]
        );

        // Loop-back: the next message starts over
        let report = bot.say("hi again").await;
        assert_eq!(report.texts(), vec![LOGGED_IN, VIEW_TOKEN_PROMPT]);
        bot.say("yes").await;
        let report = bot.say("whatever").await;
        assert_eq!(report.texts(), vec!["Your token is: T"]);
    }

    #[tokio::test]
    async fn test_declined_sign_in_ends_flow() {
        let bot = TestBot::builder()
            .tokens(MockTokenProvider::new().declining())
            .build();

        let report = bot.say("hello").await;
        assert_eq!(report.texts(), vec![LOGIN_FAILED]);
        assert_eq!(report.status, TurnStatus::Completed);
        assert!(bot.stack().await.is_empty());
    }

    #[tokio::test]
    async fn test_token_service_failure_counts_as_declined() {
        let bot = TestBot::builder()
            .tokens(MockTokenProvider::new().failing())
            .build();

        let report = bot.say("hello").await;
        assert_eq!(report.texts(), vec![LOGIN_FAILED]);
        assert_eq!(report.status, TurnStatus::Completed);
    }

    #[tokio::test]
    async fn test_sign_out_before_command_reports_failure() {
        let bot = TestBot::new();
        bot.say("hello").await;
        bot.sign_in("T").await;
        bot.say("yes").await;

        // Token revoked between turns: re-authentication asks again, user gives up
        bot.tokens.state.lock().unwrap().stored = None;
        let report = bot.say("recent").await;
        assert!(report.sign_in_card().is_some());
        let report = bot.say("never mind").await;
        assert_eq!(report.texts(), vec![PROCESS_LOGIN_FAILED]);
        assert_eq!(report.status, TurnStatus::Completed);
        assert!(bot.graph.calls().is_empty());
    }

    #[tokio::test]
    async fn test_magic_code_completes_sign_in() {
        let bot = TestBot::builder()
            .tokens(MockTokenProvider::new().with_magic_code("123456", TokenResponse::new("M", "graph")))
            .build();
        bot.say("hello").await;

        let report = bot.say("000000").await;
        assert!(report.texts().is_empty());
        assert!(bot.stack().await.pending_sign_in().is_some());

        let report = bot
            .send(TurnPayload::VerifyState {
                state: "123456".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(report.texts(), vec![LOGGED_IN, VIEW_TOKEN_PROMPT]);
        assert!(bot
            .tokens
            .calls()
            .contains(&"exchange_magic_code:123456".to_string()));
    }

    #[tokio::test]
    async fn test_sign_in_timeout_pops_prompt() {
        let bot = TestBot::builder()
            .sign_in_timeout(TimeDelta::zero())
            .build();
        let mut rx = bot.manager.subscribe("conv-1").await;

        let report = bot.say("hello").await;
        assert!(report.sign_in_card().is_some());

        let events = wait_for_completion(&mut rx, Duration::from_secs(5))
            .await
            .expect("sign-in timer should complete the flow");
        assert!(events.iter().any(|event| matches!(
            event,
            SseEvent::Message { message: OutboundMessage::Text { text } } if text == LOGIN_FAILED
        )));
        assert!(bot.stack().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_timeout_is_ignored() {
        let bot = logged_in_bot().await;
        let report = bot.send(TurnPayload::SignInTimeout).await.unwrap();
        assert_eq!(report.status, TurnStatus::Unchanged);
        assert_eq!(bot.stack().await.top().unwrap().flow, FlowId::ConfirmPrompt);
    }

    #[tokio::test]
    async fn test_logout_clears_state() {
        let bot = logged_in_bot().await;

        let report = bot.say("LOGOUT").await;
        assert_eq!(report.texts(), vec![SIGNED_OUT]);
        assert_eq!(report.status, TurnStatus::SignedOut);
        assert!(bot.storage.raw("conv-1").is_none());
        assert!(bot.tokens.calls().contains(&"sign_out".to_string()));

        // Signed out for real: the next message asks to sign in again
        let report = bot.say("hello").await;
        assert!(report.sign_in_card().is_some());
    }

    #[tokio::test]
    async fn test_members_added_welcomes_everyone_but_the_bot() {
        let bot = TestBot::new();
        let report = bot
            .send(TurnPayload::MembersAdded {
                members: vec!["bot".to_string(), "user-1".to_string(), "user-2".to_string()],
                bot_id: "bot".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(report.texts(), vec![WELCOME, WELCOME]);
        assert_eq!(report.status, TurnStatus::Unchanged);
        assert!(bot.storage.raw("conv-1").is_none());
    }

    #[tokio::test]
    async fn test_reset() {
        let bot = logged_in_bot().await;
        let report = bot.manager.reset("conv-1").await.unwrap();
        assert_eq!(report.status, TurnStatus::Cleared);
        assert!(bot.stack().await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_mirrors_turn_report() {
        let bot = TestBot::new();
        let mut rx = bot.manager.subscribe("conv-1").await;

        let report = bot.say("hello").await;

        let mut messages = 0;
        loop {
            match rx.recv().await.unwrap() {
                SseEvent::Message { .. } => messages += 1,
                SseEvent::TurnComplete { turn_id, status } => {
                    assert_eq!(turn_id, report.turn_id);
                    assert_eq!(status, report.status);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(messages, report.messages.len());
    }

    #[tokio::test]
    async fn test_stream_never_carries_tokens() {
        let bot = TestBot::new();
        bot.say("hello").await;
        bot.sign_in("secret-T").await;
        let mut rx = bot.manager.subscribe("conv-1").await;

        let report = bot.say("yes").await;
        assert!(report.texts().contains(&"Here is your token secret-T"));
        let report = bot.say("whatever").await;
        assert_eq!(report.texts(), vec!["Your token is: secret-T"]);

        let events = wait_for_completion(&mut rx, Duration::from_secs(5))
            .await
            .expect("flow should complete");
        let streamed: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                SseEvent::Message { message } => message.as_text(),
                _ => None,
            })
            .collect();
        assert!(streamed.contains(&"Here is your token <redacted>"));
        assert!(streamed.contains(&"Your token is: <redacted>"));
        assert!(streamed.iter().all(|text| !text.contains("secret-T")));
    }

    #[tokio::test]
    async fn test_token_never_persisted() {
        let bot = TestBot::new();
        bot.say("hello").await;
        bot.sign_in("super-secret-token").await;
        bot.say("yes").await;

        let json = bot.storage.raw("conv-1").unwrap();
        assert!(!json.contains("super-secret-token"));
        assert!(json.contains("text_prompt"));
    }

    #[tokio::test]
    async fn test_step_error_leaves_state_for_replay() {
        let bot = TestBot::new();
        // Main waiting on its process step with no command stored
        let broken = DialogStack::from_frames(vec![StackFrame {
            flow: FlowId::Main,
            step_index: 5,
            values: FrameValues::main(),
        }]);
        bot.storage.save_stack("conv-1", &broken).await.unwrap();
        let before = bot.storage.raw("conv-1");

        for _ in 0..2 {
            let result = bot
                .send(TurnPayload::Message {
                    text: "recent".to_string(),
                })
                .await;
            assert!(matches!(
                result,
                Err(TurnError::Step(StepExecutionError::MissingCommand))
            ));
            assert_eq!(bot.storage.raw("conv-1"), before);
        }
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_turn() {
        let bot = TestBot::new();
        bot.storage.put_raw("conv-1", "{broken");
        let result = bot.send(TurnPayload::Message { text: "hi".to_string() }).await;
        assert!(matches!(result, Err(TurnError::Storage(_))));
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let bot = logged_in_bot().await;
        let other = InboundEvent {
            conversation: ConversationRef::new("conv-2", "user-2", "test"),
            payload: TurnPayload::Message {
                text: "no".to_string(),
            },
        };

        // "no" to a fresh conversation starts its own flow
        let report = bot.manager.submit(other).await.unwrap();
        assert_eq!(report.conversation_id, "conv-2");
        assert_eq!(bot.stack().await.top().unwrap().flow, FlowId::ConfirmPrompt);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_storage() {
        let storage = Arc::new(InMemoryStateStore::new());
        let tokens = {
            let bot = TestBot::builder().build_with(Arc::clone(&storage));
            bot.say("hello").await;
            bot.sign_in("T").await;
            Arc::clone(&bot.tokens)
        };

        // New manager, same storage: nothing survives but the saved stack
        let manager: TestManager<Arc<InMemoryStateStore>> = RuntimeManager::new(
            Arc::clone(&storage),
            tokens,
            Arc::new(MockGraphApi::new()),
            test_settings(),
        );
        let report = manager
            .submit(InboundEvent {
                conversation: ConversationRef::new("conv-1", "user-1", "test"),
                payload: TurnPayload::Message {
                    text: "no".to_string(),
                },
            })
            .await
            .unwrap();
        assert_eq!(report.texts(), vec![THANK_YOU]);
        assert_eq!(report.status, TurnStatus::Completed);
    }

    #[tokio::test]
    async fn test_sqlite_restart_resumes_flow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");

        let tokens = {
            let storage = DatabaseStorage::new(Database::open(&path).unwrap());
            let bot = TestBot::builder().build_with(storage);
            bot.say("hello").await;
            bot.sign_in("T").await;
            Arc::clone(&bot.tokens)
        };

        let storage = DatabaseStorage::new(Database::open(&path).unwrap());
        assert_eq!(
            storage.load_stack("conv-1").await.unwrap().top().unwrap().flow,
            FlowId::ConfirmPrompt
        );
        let manager: TestManager<DatabaseStorage> = RuntimeManager::new(
            storage,
            tokens,
            Arc::new(MockGraphApi::new()),
            test_settings(),
        );
        let report = manager
            .submit(InboundEvent {
                conversation: ConversationRef::new("conv-1", "user-1", "test"),
                payload: TurnPayload::Message {
                    text: "yes".to_string(),
                },
            })
            .await
            .unwrap();
        assert_eq!(
            report.texts(),
            vec![THANK_YOU, "Here is your token T", COMMAND_PROMPT]
        );
    }

    #[tokio::test]
    async fn test_rearm_starts_runtimes_for_saved_stacks() {
        let bot = logged_in_bot().await;
        assert_eq!(bot.manager.rearm_sign_in_timers().await.unwrap(), 1);
    }
}
