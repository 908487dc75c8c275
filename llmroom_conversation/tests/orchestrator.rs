//! End-to-end tests of message handling against in-memory SQLite, a scripted
//! backend and a transport that records what it was asked to send.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use llmroom_config::BackendConfig;
use llmroom_conversation::{
    Components, ContextWindow, ERROR_REPLY, IgnoreReason, OrchestratorError,
    OrchestratorSettings, Outcome, RoomService,
};
use llmroom_core::{
    Allowlist, Backend, ChatTransport, Completion, ConfigurationError, ContextStore,
    InboundMessage, OverrideChange, Role, RoomOverrides, RoomStore, Turn,
};
use llmroom_entities::rooms;
use llmroom_providers::BackendRegistry;
use llmroom_store::SqlStore;
use sea_orm::EntityTrait;

#[derive(Clone)]
enum Reply {
    Text(String),
    Slow(Duration, String),
    Empty,
    Fail,
}

#[derive(Debug, Clone)]
struct Call {
    model: String,
    system: String,
    context: Vec<(Role, String)>,
}

struct Script {
    reply: Mutex<Reply>,
    calls: Mutex<Vec<Call>>,
}

impl Script {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Reply::Text("hi".to_string())),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

struct ScriptedBackend {
    default_model: String,
    default_system_prompt: String,
    script: Arc<Script>,
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_system_prompt(&self) -> &str {
        &self.default_system_prompt
    }

    async fn create_chat_completion(
        &self,
        _http: &reqwest::Client,
        context: &[Turn],
        system: &str,
        model: &str,
    ) -> anyhow::Result<Completion> {
        self.script.calls.lock().unwrap().push(Call {
            model: model.to_string(),
            system: system.to_string(),
            context: context
                .iter()
                .map(|turn| (turn.role, turn.content.clone()))
                .collect(),
        });

        let reply = self.script.reply.lock().unwrap().clone();
        match reply {
            Reply::Text(text) => Ok(Completion::assistant(text)),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(Completion::assistant(text))
            }
            Reply::Empty => Ok(Completion::assistant("  ".to_string())),
            Reply::Fail => anyhow::bail!("upstream returned 502"),
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    marked: AtomicUsize,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn mark_read(&self, _message: &InboundMessage) -> anyhow::Result<()> {
        self.marked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn respond(&self, room_id: &str, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((room_id.to_string(), text.to_string()));
        Ok(())
    }
}

struct Harness {
    store: Arc<SqlStore>,
    script: Arc<Script>,
    transport: Arc<RecordingTransport>,
    service: RoomService,
}

impl Harness {
    async fn new(settings: OrchestratorSettings) -> Self {
        let store = Arc::new(SqlStore::connect("sqlite::memory:").await.unwrap());
        let script = Script::new();
        let transport = Arc::new(RecordingTransport::default());

        let factory_script = Arc::clone(&script);
        let backends = BackendRegistry::builder()
            .factory(
                "basic",
                move |config: &BackendConfig| -> anyhow::Result<Arc<dyn Backend>> {
                    Ok(Arc::new(ScriptedBackend {
                        default_model: config.default_model.clone(),
                        default_system_prompt: config.default_system_prompt.clone(),
                        script: Arc::clone(&factory_script),
                    }))
                },
            )
            .build(&backend_configs())
            .unwrap();

        let components = Components {
            rooms: store.clone(),
            context: store.clone(),
            backends: Arc::new(backends),
            transport: transport.clone(),
            http: reqwest::Client::new(),
        };

        Self {
            store,
            script,
            transport,
            service: RoomService::new(components, settings),
        }
    }

    async fn open() -> Self {
        Self::new(OrchestratorSettings::new(Allowlist::Disabled, "b1")).await
    }

    async fn send(
        &self,
        sender: &str,
        room: &str,
        body: &str,
    ) -> Result<Outcome, OrchestratorError> {
        self.service
            .on_message(&InboundMessage::new(sender, room, body))
            .await
    }

    async fn history(&self, room: &str) -> Vec<(Role, String)> {
        self.store
            .fetch(room)
            .await
            .unwrap()
            .into_iter()
            .map(|turn| (turn.role, turn.content))
            .collect()
    }

    async fn room_exists(&self, room: &str) -> bool {
        rooms::Entity::find_by_id(room.to_string())
            .one(self.store.db())
            .await
            .unwrap()
            .is_some()
    }
}

fn backend_config(model: &str, system: &str) -> BackendConfig {
    BackendConfig {
        kind: "basic".to_string(),
        endpoint: None,
        credential: None,
        default_model: model.to_string(),
        default_system_prompt: system.to_string(),
        timeout_secs: None,
        retry_delays_secs: Vec::new(),
    }
}

fn backend_configs() -> BTreeMap<String, BackendConfig> {
    BTreeMap::from([
        ("b1".to_string(), backend_config("m1", "s1")),
        ("b2".to_string(), backend_config("m2", "s2")),
    ])
}

fn user(content: &str) -> (Role, String) {
    (Role::User, content.to_string())
}

fn assistant(content: &str) -> (Role, String) {
    (Role::Assistant, content.to_string())
}

#[tokio::test]
async fn test_first_message_creates_room_and_replies() {
    let h = Harness::open().await;

    let outcome = h.send("u1", "r1", "hello").await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Replied(Completion::assistant("hi".to_string()))
    );

    let room = h.store.get_or_create("r1").await.unwrap();
    assert!(room.backend.is_none());
    assert!(room.model.is_none());
    assert!(room.system_prompt.is_none());

    assert_eq!(h.history("r1").await, [user("hello"), assistant("hi")]);
    assert_eq!(h.transport.sent(), [("r1".to_string(), "hi".to_string())]);
    assert_eq!(h.transport.marked.load(Ordering::SeqCst), 1);

    let calls = h.script.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model, "m1");
    assert_eq!(calls[0].system, "s1");
    assert_eq!(calls[0].context, [user("hello")]);
}

#[tokio::test]
async fn test_unauthorized_sender_leaves_no_trace() {
    let h = Harness::new(OrchestratorSettings::new(Allowlist::only(["u1"]), "b1")).await;

    let outcome = h.send("u2", "r1", "hello").await.unwrap();

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::Unauthorized));
    assert!(!h.room_exists("r1").await);
    assert_eq!(h.store.count("r1").await.unwrap(), 0);
    assert!(h.transport.sent().is_empty());
    assert!(h.script.calls().is_empty());
}

#[tokio::test]
async fn test_missing_backend_key_keeps_user_turn_only() {
    let h = Harness::open().await;
    h.store
        .update_overrides(
            "r1",
            &RoomOverrides {
                backend: OverrideChange::Set("missing_key".to_string()),
                ..RoomOverrides::default()
            },
        )
        .await
        .unwrap();

    let err = h.send("u1", "r1", "hello").await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Configuration(ConfigurationError::MissingBackendKey(ref key))
            if key == "missing_key"
    ));
    assert_eq!(h.history("r1").await, [user("hello")]);
    assert!(h.transport.sent().is_empty());
    assert!(h.script.calls().is_empty());
}

#[tokio::test]
async fn test_room_overrides_take_precedence() {
    let h = Harness::open().await;
    h.store
        .update_overrides(
            "r1",
            &RoomOverrides {
                backend: OverrideChange::Set("b2".to_string()),
                model: OverrideChange::Set("custom-model".to_string()),
                system_prompt: OverrideChange::Set("be terse".to_string()),
            },
        )
        .await
        .unwrap();

    h.send("u1", "r1", "hello").await.unwrap();
    h.send("u1", "r2", "hello").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(calls[0].model, "custom-model");
    assert_eq!(calls[0].system, "be terse");
    assert_eq!(calls[1].model, "m1");
    assert_eq!(calls[1].system, "s1");
}

#[tokio::test]
async fn test_backend_override_uses_that_backends_defaults() {
    let h = Harness::open().await;
    h.store
        .update_overrides(
            "r1",
            &RoomOverrides {
                backend: OverrideChange::Set("b2".to_string()),
                ..RoomOverrides::default()
            },
        )
        .await
        .unwrap();

    h.send("u1", "r1", "hello").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(calls[0].model, "m2");
    assert_eq!(calls[0].system, "s2");
}

#[tokio::test]
async fn test_empty_overrides_use_backend_defaults() {
    let h = Harness::open().await;
    h.store
        .update_overrides(
            "r1",
            &RoomOverrides {
                model: OverrideChange::Set(String::new()),
                system_prompt: OverrideChange::Set(String::new()),
                ..RoomOverrides::default()
            },
        )
        .await
        .unwrap();

    h.send("u1", "r1", "hello").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(calls[0].model, "m1");
    assert_eq!(calls[0].system, "s1");
}

#[tokio::test]
async fn test_history_grows_across_messages() {
    let h = Harness::open().await;

    h.send("u1", "r1", "one").await.unwrap();
    h.script.set_reply(Reply::Text("two".to_string()));
    h.send("u1", "r1", "three").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(
        calls[1].context,
        [user("one"), assistant("hi"), user("three")]
    );
    assert_eq!(
        h.history("r1").await,
        [user("one"), assistant("hi"), user("three"), assistant("two")]
    );
    assert!(h.history("r2").await.is_empty());
}

#[tokio::test]
async fn test_context_window_limits_what_is_sent() {
    let mut settings = OrchestratorSettings::new(Allowlist::Disabled, "b1");
    settings.context_window = ContextWindow::LastTurns(2);
    let h = Harness::new(settings).await;

    h.send("u1", "r1", "one").await.unwrap();
    h.send("u1", "r1", "two").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(calls[1].context, [assistant("hi"), user("two")]);
    assert_eq!(h.store.count("r1").await.unwrap(), 4);
}

#[tokio::test]
async fn test_backend_failure_sends_error_reply() {
    let h = Harness::open().await;
    h.script.set_reply(Reply::Fail);

    let err = h.send("u1", "r1", "hello").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Backend(_)));
    assert_eq!(h.history("r1").await, [user("hello")]);
    assert_eq!(
        h.transport.sent(),
        [("r1".to_string(), ERROR_REPLY.to_string())]
    );
}

#[tokio::test]
async fn test_backend_failure_is_silent_without_error_reply() {
    let mut settings = OrchestratorSettings::new(Allowlist::Disabled, "b1");
    settings.error_reply = false;
    let h = Harness::new(settings).await;
    h.script.set_reply(Reply::Fail);

    assert!(h.send("u1", "r1", "hello").await.is_err());
    assert_eq!(h.history("r1").await, [user("hello")]);
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn test_empty_completion_is_not_stored() {
    let h = Harness::open().await;
    h.script.set_reply(Reply::Empty);

    let err = h.send("u1", "r1", "hello").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::EmptyCompletion));
    assert_eq!(h.history("r1").await, [user("hello")]);
    assert_eq!(h.transport.sent().len(), 1);
}

#[tokio::test]
async fn test_backend_timeout() {
    let mut settings = OrchestratorSettings::new(Allowlist::Disabled, "b1");
    settings.backend_timeout = Some(Duration::from_millis(50));
    let h = Harness::new(settings).await;
    h.script
        .set_reply(Reply::Slow(Duration::from_secs(5), "late".to_string()));

    let err = h.send("u1", "r1", "hello").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::BackendTimeout(_)));
    assert_eq!(h.history("r1").await, [user("hello")]);
    assert_eq!(
        h.transport.sent(),
        [("r1".to_string(), ERROR_REPLY.to_string())]
    );
}

#[tokio::test]
async fn test_same_room_messages_are_serialized() {
    let h = Arc::new(Harness::open().await);
    h.script
        .set_reply(Reply::Slow(Duration::from_millis(30), "hi".to_string()));

    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.send("u1", "r1", "a").await })
    };
    let second = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.send("u2", "r1", "b").await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let roles: Vec<Role> = h
        .history("r1")
        .await
        .into_iter()
        .map(|(role, _)| role)
        .collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    let mut sizes: Vec<usize> = h.script.calls().iter().map(|c| c.context.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, [1, 3]);
}

#[tokio::test]
async fn test_commands_are_not_relayed() {
    let h = Harness::open().await;

    let outcome = h.send("u1", "r1", "!help").await.unwrap();

    assert_eq!(outcome, Outcome::Ignored(IgnoreReason::Command));
    assert_eq!(h.store.count("r1").await.unwrap(), 0);
    assert!(h.script.calls().is_empty());

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("!model <name>"));
}

#[tokio::test]
async fn test_unauthorized_commands_are_ignored() {
    let h = Harness::new(OrchestratorSettings::new(Allowlist::only(["u1"]), "b1")).await;

    h.send("u2", "r1", "!model evil").await.unwrap();

    assert!(h.transport.sent().is_empty());
    assert!(!h.room_exists("r1").await);
}

#[tokio::test]
async fn test_model_command_changes_following_replies() {
    let h = Harness::open().await;

    h.send("u1", "r1", "!model m9").await.unwrap();
    h.send("u1", "r1", "hello").await.unwrap();
    h.send("u1", "r1", "!model").await.unwrap();
    h.send("u1", "r1", "again").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(calls[0].model, "m9");
    assert_eq!(calls[1].model, "m1");
    assert_eq!(h.store.count("r1").await.unwrap(), 4);
}

#[tokio::test]
async fn test_system_command_sets_and_clears_prompt() {
    let h = Harness::open().await;

    h.send("u1", "r1", "!system Answer in French.").await.unwrap();
    h.send("u1", "r1", "hello").await.unwrap();
    h.send("u1", "r1", "!system").await.unwrap();
    h.send("u1", "r1", "hello").await.unwrap();

    let calls = h.script.calls();
    assert_eq!(calls[0].system, "Answer in French.");
    assert_eq!(calls[1].system, "s1");
}

#[tokio::test]
async fn test_backend_command_rejects_unknown_keys() {
    let h = Harness::open().await;

    h.send("u1", "r1", "!backend nowhere").await.unwrap();
    h.send("u1", "r1", "!backend b2").await.unwrap();

    let sent = h.transport.sent();
    assert!(sent[0].1.contains("Cannot use backend `nowhere`"));
    assert!(sent[1].1.contains("`b2`"));

    let room = h.store.get_or_create("r1").await.unwrap();
    assert_eq!(room.backend.as_deref(), Some("b2"));
}

#[tokio::test]
async fn test_room_command_reports_settings() {
    let h = Harness::open().await;
    h.send("u1", "r1", "hello").await.unwrap();
    h.send("u1", "r1", "!model m9").await.unwrap();

    h.send("u1", "r1", "!room").await.unwrap();

    let sent = h.transport.sent();
    let info = &sent.last().unwrap().1;
    assert!(info.contains("Room: r1"));
    assert!(info.contains("Backend: b1 (default)"));
    assert!(info.contains("Model: m9"));
    assert!(info.contains("Stored turns: 2"));
}

#[tokio::test]
async fn test_unknown_command_gets_hint() {
    let h = Harness::open().await;

    h.send("u1", "r1", "!frobnicate").await.unwrap();

    let sent = h.transport.sent();
    assert!(sent[0].1.contains("Unknown command `!frobnicate`"));
}
