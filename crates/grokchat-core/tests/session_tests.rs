//! Session controller tests driven by a scripted completion client.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use grokchat_core::constants::models;
use grokchat_core::llm::{
    CompletionClient, CompletionRequest, CompletionResponse, FragmentStream, StreamEvent,
};
use grokchat_core::session::{Session, SessionEvent, TurnOutcome};
use grokchat_core::{
    AgentConfig, AgentPaths, ChatError, FileResolver, Result, Role, RunOverrides,
};
use std::collections::VecDeque;
use std::future;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

// ========================================================================
// Scripted client
// ========================================================================

#[derive(Clone)]
enum Reply {
    Text(String),
    Fragments(Vec<String>, bool),
    Fail(String),
    /// Yields the fragments and then never finishes.
    Hang(Vec<String>),
}

#[derive(Clone, Default)]
struct ScriptedClient {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedClient {
    fn with(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            requests: Arc::default(),
        }
    }

    fn next(&self, request: &CompletionRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected request")
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        match self.next(request) {
            Reply::Text(content) => Ok(CompletionResponse {
                content,
                usage: None,
            }),
            Reply::Fail(message) => Err(ChatError::Remote(message)),
            _ => panic!("streamed reply scripted for a non-streamed call"),
        }
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        match self.next(request) {
            Reply::Fragments(parts, with_done) => {
                let mut events: Vec<Result<StreamEvent>> = parts
                    .into_iter()
                    .map(|p| Ok(StreamEvent::TextDelta(p)))
                    .collect();
                if with_done {
                    events.push(Ok(StreamEvent::Done));
                }
                Ok(stream::iter(events).boxed())
            }
            Reply::Hang(parts) => {
                let head = stream::iter(parts.into_iter().map(|p| Ok(StreamEvent::TextDelta(p))));
                Ok(head.chain(stream::pending()).boxed())
            }
            Reply::Fail(message) => Err(ChatError::Remote(message)),
            Reply::Text(_) => panic!("non-streamed reply scripted for a streamed call"),
        }
    }
}

// ========================================================================
// Helpers
// ========================================================================

struct Fixture {
    _dir: TempDir,
    workdir: TempDir,
    session: Session,
    client: ScriptedClient,
}

fn fixture(replies: Vec<Reply>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let client = ScriptedClient::with(replies);
    let paths = AgentPaths::new(dir.path(), "test-agent").unwrap();
    let session = Session::open(
        paths,
        &models::GROK4,
        Box::new(client.clone()),
        workdir.path(),
    )
    .unwrap();
    Fixture {
        _dir: dir,
        workdir,
        session,
        client,
    }
}

fn fragments(parts: &[&str]) -> Reply {
    Reply::Fragments(parts.iter().map(|p| p.to_string()).collect(), true)
}

async fn send(session: &mut Session, input: &str) -> (Result<TurnOutcome>, Vec<SessionEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = session.send(input, tx, future::pending()).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

// ========================================================================
// Tests
// ========================================================================

#[tokio::test]
async fn test_streamed_turn_appends_user_and_assistant() {
    let mut fx = fixture(vec![fragments(&["Hel", "lo"])]);

    let (result, events) = send(&mut fx.session, "hi").await;

    assert_eq!(
        result.unwrap(),
        TurnOutcome::Completed {
            response: "Hello".into()
        }
    );
    let turns = fx.session.history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!((turns[0].role, turns[0].content.as_str()), (Role::User, "hi"));
    assert_eq!(
        (turns[1].role, turns[1].content.as_str()),
        (Role::Assistant, "Hello")
    );

    let deltas: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::TextDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert!(matches!(events.last(), Some(SessionEvent::Complete { .. })));
}

#[tokio::test]
async fn test_request_contains_system_prompt_history_and_new_turn() {
    let mut fx = fixture(vec![fragments(&["first"]), fragments(&["second"])]);

    send(&mut fx.session, "one").await.0.unwrap();
    send(&mut fx.session, "two").await.0.unwrap();

    let requests = fx.client.requests();
    let last = &requests[1];
    let roles: Vec<_> = last.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(last.messages[0].content, "You are a helpful assistant.");
    assert_eq!(last.messages[3].content, "two");
    assert_eq!(last.model, "grok-4-latest");
    assert!(last.stream);
}

#[tokio::test]
async fn test_failed_call_leaves_history_unchanged() {
    let mut fx = fixture(vec![fragments(&["ok"]), Reply::Fail("upstream down".into())]);
    send(&mut fx.session, "first").await.0.unwrap();
    let before = fx.session.history().turns().to_vec();

    let (result, events) = send(&mut fx.session, "second").await;

    let err = result.unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(fx.session.history().turns(), before.as_slice());
    assert!(matches!(events.last(), Some(SessionEvent::Error(_))));
}

#[tokio::test]
async fn test_stream_without_end_marker_appends_nothing() {
    let mut fx = fixture(vec![Reply::Fragments(vec!["half".into()], false)]);

    let (result, _) = send(&mut fx.session, "hi").await;

    assert!(matches!(result, Err(ChatError::Remote(_))));
    assert!(fx.session.history().is_empty());
}

#[tokio::test]
async fn test_interrupt_keeps_partial_out_of_history() {
    let mut fx = fixture(vec![Reply::Hang(vec!["partial ".into(), "text".into()])]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Cancel once both fragments have been delivered.
    let cancel = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    };
    let outcome = fx.session.send("hi", tx, cancel).await.unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Interrupted {
            partial: "partial text".into()
        }
    );
    assert!(fx.session.history().is_empty());

    let mut saw_interrupt = false;
    while let Ok(event) = rx.try_recv() {
        saw_interrupt |= matches!(event, SessionEvent::Interrupted);
    }
    assert!(saw_interrupt);
}

#[tokio::test]
async fn test_non_streamed_turn_with_override() {
    let fx = fixture(vec![Reply::Text("batch answer".into())]);
    let client = fx.client.clone();
    let mut session = fx
        .session
        .with_overrides(RunOverrides {
            temperature: Some(0.9),
            stream: Some(false),
        })
        .unwrap();

    let (result, _) = send(&mut session, "hi").await;

    assert!(matches!(result.unwrap(), TurnOutcome::Completed { .. }));
    let request = &client.requests()[0];
    assert!(!request.stream);
    assert_eq!(request.temperature, 0.9);
    // Overrides are never written back.
    assert!(session.config().stream);
    assert_eq!(session.config().temperature, 0.0);
}

#[tokio::test]
async fn test_invalid_override_rejected() {
    let fx = fixture(vec![]);
    let result = fx.session.with_overrides(RunOverrides {
        temperature: Some(3.5),
        stream: None,
    });
    assert!(matches!(result, Err(ChatError::Config(_))));
}

#[tokio::test]
async fn test_inclusion_resolved_for_request_raw_text_stored() {
    let mut fx = fixture(vec![fragments(&["seen it"])]);
    std::fs::write(fx.workdir.path().join("a.py"), "print(1)").unwrap();
    let resolver = FileResolver::new(vec![fx.workdir.path().to_path_buf()]);
    let client = fx.client.clone();
    let mut session = fx.session.with_resolver(resolver);

    let (result, events) = send(&mut session, "see {a.py} and {missing.txt}").await;
    result.unwrap();

    let requests = client.requests();
    let sent = &requests[0].messages.last().unwrap().content;
    assert!(sent.contains("print(1)"));
    assert!(!sent.contains("{a.py}"));
    assert!(sent.contains("[ERROR: File missing.txt not found]"));

    assert_eq!(
        session.history().turns()[0].content,
        "see {a.py} and {missing.txt}"
    );
    let inclusions = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Inclusion(_)))
        .count();
    assert_eq!(inclusions, 2);

    let failures: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Inclusion(outcome) => outcome.to_error(),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].to_string().contains("missing.txt: file not found"));
}

#[tokio::test]
async fn test_history_bound_holds_across_turns() {
    let replies = (0..3).map(|i| fragments(&[format!("r{i}").as_str()])).collect();
    let mut fx = fixture(replies);
    fx.session.update_config(|c| c.max_history_size = 2).unwrap();

    for i in 0..3 {
        send(&mut fx.session, &format!("q{i}")).await.0.unwrap();
        assert!(fx.session.history().len() <= 2);
    }
    let contents: Vec<_> = fx
        .session
        .history()
        .turns()
        .iter()
        .map(|t| t.content.clone())
        .collect();
    assert_eq!(contents, vec!["q2", "r2"]);
}

#[tokio::test]
async fn test_update_config_persists_and_reopens() {
    let dir = TempDir::new().unwrap();
    let workdir = TempDir::new().unwrap();
    let open = || {
        Session::open(
            AgentPaths::new(dir.path(), "persist").unwrap(),
            &models::GROK3,
            Box::new(ScriptedClient::default()),
            workdir.path(),
        )
        .unwrap()
    };

    let mut session = open();
    session.update_config(|c| c.temperature = 0.4).unwrap();
    assert!(session.update_config(|c| c.top_p = 2.0).is_err());
    drop(session);

    let session = open();
    assert_eq!(session.config().temperature, 0.4);
    assert_eq!(session.config().top_p, 1.0);
    assert_eq!(session.model().key, "grok3");
}

#[tokio::test]
async fn test_update_config_storage_failure_changes_nothing() {
    let mut fx = fixture(vec![fragments(&["r1"]), fragments(&["r2"])]);
    send(&mut fx.session, "q1").await.0.unwrap();
    send(&mut fx.session, "q2").await.0.unwrap();

    let backups = fx.session.paths().backups_dir();
    std::fs::remove_dir_all(&backups).unwrap();
    std::fs::write(&backups, "not a directory").unwrap();
    let before = fx.session.config().clone();

    let err = fx
        .session
        .update_config(|c| c.max_history_size = 2)
        .unwrap_err();

    assert!(!err.is_recoverable());
    assert_eq!(fx.session.config(), &before);
    assert_eq!(fx.session.history().len(), 4);
    assert_eq!(fx.session.history().max_size(), before.max_history_size);
    let persisted = AgentConfig::load(&fx.session.paths().config_file())
        .unwrap()
        .unwrap();
    assert_eq!(persisted, before);
}

#[tokio::test]
async fn test_clear_and_export() {
    let mut fx = fixture(vec![fragments(&["answer"])]);
    send(&mut fx.session, "question").await.0.unwrap();

    let path = fx.session.export(grokchat_core::ExportFormat::Json).unwrap();
    let doc = grokchat_core::export::parse_json_export(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc.messages.len(), 2);
    assert_eq!(doc.agent_id, "test-agent");
    assert_eq!(doc.model, "Grok 4");

    let snapshot = fx.session.clear_history().unwrap().unwrap();
    assert!(fx.session.history().is_empty());
    assert!(snapshot.starts_with(fx.session.paths().backups_dir()));
}
