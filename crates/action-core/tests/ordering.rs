use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use action_core::{
    ActionError, ActionOptions, ActionPayload, ActionTransport, AnalyticsSink, Dispatcher,
    ErrorReporter, HttpTransport, ReceiptStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(String),
    Finish(String),
}

/// Records every call, sleeps for a per-action delay, and fails the actions
/// listed in `fail`.
#[derive(Default)]
struct FakeTransport {
    delays: HashMap<String, Duration>,
    fail: Vec<String>,
    hang: Vec<String>,
    events: Mutex<Vec<Event>>,
    sent: Mutex<Vec<(ActionPayload, DateTime<Utc>)>>,
}

impl FakeTransport {
    fn delay(mut self, action: &str, ms: u64) -> Self {
        self.delays.insert(action.into(), Duration::from_millis(ms));
        self
    }

    fn failing(mut self, action: &str) -> Self {
        self.fail.push(action.into());
        self
    }

    fn hanging(mut self, action: &str) -> Self {
        self.hang.push(action.into());
        self
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn sent_actions(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.action.clone())
            .collect()
    }
}

#[async_trait]
impl ActionTransport for FakeTransport {
    async fn post_action(&self, payload: &ActionPayload) -> action_core::Result<()> {
        let name = payload.action.clone();
        self.events.lock().unwrap().push(Event::Start(name.clone()));
        self.sent.lock().unwrap().push((payload.clone(), Utc::now()));

        if self.hang.contains(&name) {
            std::future::pending::<()>().await;
        }
        if let Some(d) = self.delays.get(&name) {
            tokio::time::sleep(*d).await;
        }
        self.events.lock().unwrap().push(Event::Finish(name.clone()));

        if self.fail.contains(&name) {
            return Err(ActionError::Status {
                status: 500,
                body: format!("failed {name}"),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl AnalyticsSink for RecordingSink {
    fn track(&self, event: &str, _properties: &serde_json::Value) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

#[derive(Default)]
struct RecordingReporter {
    errors: Mutex<Vec<String>>,
}

impl ErrorReporter for RecordingReporter {
    fn capture_exception(&self, error: &ActionError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

struct Harness {
    transport: Arc<FakeTransport>,
    sink: Arc<RecordingSink>,
    reporter: Arc<RecordingReporter>,
    dispatcher: Dispatcher,
}

fn harness(transport: FakeTransport) -> Harness {
    harness_with_timeout(transport, None)
}

fn harness_with_timeout(transport: FakeTransport, timeout: Option<Duration>) -> Harness {
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());
    let reporter = Arc::new(RecordingReporter::default());
    let dispatcher = Dispatcher::builder(transport.clone())
        .sink(sink.clone())
        .reporter(reporter.clone())
        .relay_timeout(timeout)
        .spawn();
    Harness {
        transport,
        sink,
        reporter,
        dispatcher,
    }
}

fn none() -> ActionOptions {
    ActionOptions::default()
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relays_start_in_submission_order_even_when_earlier_ones_are_slower() {
    let h = harness(
        FakeTransport::default()
            .delay("a", 60)
            .delay("b", 30)
            .delay("c", 5),
    );
    h.dispatcher.add_action("a", none());
    h.dispatcher.add_action("b", none());
    let last = h.dispatcher.add_action("c", none());
    assert_eq!(last.await, ReceiptStatus::Posted);

    assert_eq!(
        h.transport.events(),
        vec![
            Event::Start("a".into()),
            Event::Finish("a".into()),
            Event::Start("b".into()),
            Event::Finish("b".into()),
            Event::Start("c".into()),
            Event::Finish("c".into()),
        ]
    );
}

#[tokio::test]
async fn each_action_is_sent_exactly_once_even_on_failure() {
    let h = harness(FakeTransport::default().failing("b"));
    for name in ["a", "b", "c", "d"] {
        h.dispatcher.add_action(name, none());
    }
    let stats = h.dispatcher.shutdown().await;

    assert_eq!(h.transport.sent_actions(), vec!["a", "b", "c", "d"]);
    assert_eq!(stats.enqueued, 4);
    assert_eq!(stats.posted, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn concurrent_producers_keep_their_own_order() {
    let h = harness(FakeTransport::default());
    let dispatcher = Arc::new(h.dispatcher);

    let mut tasks = Vec::new();
    for producer in 0..4 {
        let d = Arc::clone(&dispatcher);
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                d.add_action(format!("p{producer}-{i}"), ActionOptions::default());
                tokio::task::yield_now().await;
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    dispatcher.flush().await;

    let sent = h.transport.sent_actions();
    assert_eq!(sent.len(), 40);
    for producer in 0..4 {
        let prefix = format!("p{producer}-");
        let mine: Vec<_> = sent.iter().filter(|s| s.starts_with(&prefix)).cloned().collect();
        let expected: Vec<_> = (0..10).map(|i| format!("{prefix}{i}")).collect();
        assert_eq!(mine, expected);
    }
}

// ---------------------------------------------------------------------------
// Idle / active
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chain_returns_to_idle_and_restarts_fresh() {
    let h = harness(FakeTransport::default().delay("first", 10));
    assert!(h.dispatcher.is_idle());

    let receipt = h.dispatcher.add_action("first", none());
    assert!(!h.dispatcher.is_idle());
    receipt.await;
    assert!(h.dispatcher.is_idle());

    let second = h.dispatcher.add_action("second", none());
    assert_eq!(second.await, ReceiptStatus::Posted);
    assert!(h.dispatcher.is_idle());
    assert_eq!(h.transport.sent_actions(), vec!["first", "second"]);
}

struct SignalTransport {
    started: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl ActionTransport for SignalTransport {
    async fn post_action(&self, _payload: &ActionPayload) -> action_core::Result<()> {
        if let Some(tx) = self.started.lock().unwrap().take() {
            let _ = tx.send(());
        }
        Ok(())
    }
}

#[tokio::test]
async fn first_action_from_idle_relays_immediately() {
    let (tx, rx) = oneshot::channel();
    let transport = Arc::new(SignalTransport {
        started: Mutex::new(Some(tx)),
    });
    let dispatcher = Dispatcher::builder(transport).spawn();

    // Receipt dropped on purpose: the relay must not depend on it.
    drop(dispatcher.add_action("x", none()));

    tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("relay did not start")
        .unwrap();
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timestamp_is_taken_at_add_not_at_send() {
    let h = harness(FakeTransport::default().delay("slow", 80));
    h.dispatcher.add_action("slow", none());
    let before_add = Utc::now();
    let receipt = h.dispatcher.add_action("queued", none());
    receipt.await;

    let sent = h.transport.sent.lock().unwrap().clone();
    let (payload, sent_at) = sent.iter().find(|(p, _)| p.action == "queued").unwrap();
    let stamped: DateTime<Utc> = payload.client_timestamp.parse().unwrap();

    // Millisecond precision on the wire.
    assert!(stamped >= before_add - chrono::Duration::milliseconds(1));
    assert!(*sent_at - stamped >= chrono::Duration::milliseconds(50));
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_in_the_middle_does_not_stall_the_chain() {
    let h = harness(FakeTransport::default().failing("B"));
    let a = h.dispatcher.add_action("A", none());
    let b = h.dispatcher.add_action("B", none());
    let c = h.dispatcher.add_action("C", none());

    assert_eq!(a.await, ReceiptStatus::Posted);
    assert_eq!(b.await, ReceiptStatus::Failed);
    assert_eq!(c.await, ReceiptStatus::Posted);

    assert_eq!(*h.sink.events.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(h.transport.sent_actions(), vec!["A", "B", "C"]);

    let errors = h.reporter.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("500"));
    assert!(errors[0].contains("failed B"));
}

/// Panics on `track` for one event name, records the rest.
struct PanicSink {
    on: &'static str,
    events: Mutex<Vec<String>>,
}

impl AnalyticsSink for PanicSink {
    fn track(&self, event: &str, _properties: &serde_json::Value) {
        if event == self.on {
            panic!("sink exploded on {event}");
        }
        self.events.lock().unwrap().push(event.to_string());
    }
}

#[tokio::test]
async fn sink_panic_does_not_stop_the_chain() {
    let transport = Arc::new(FakeTransport::default());
    let sink = Arc::new(PanicSink {
        on: "B",
        events: Mutex::new(Vec::new()),
    });
    let reporter = Arc::new(RecordingReporter::default());
    let dispatcher = Dispatcher::new(transport.clone(), sink.clone(), reporter.clone());

    let a = dispatcher.add_action("A", none());
    let b = dispatcher.add_action("B", none());
    let c = dispatcher.add_action("C", none());
    assert_eq!(a.await, ReceiptStatus::Posted);
    assert_eq!(b.await, ReceiptStatus::Posted);
    assert_eq!(c.await, ReceiptStatus::Posted);

    assert_eq!(transport.sent_actions(), vec!["A", "B", "C"]);
    assert_eq!(*sink.events.lock().unwrap(), vec!["A", "C"]);
    assert!(reporter.errors.lock().unwrap().is_empty());
    assert!(dispatcher.is_idle());

    let d = dispatcher.add_action("D", none());
    assert_eq!(d.await, ReceiptStatus::Posted);

    let stats = dispatcher.shutdown().await;
    assert_eq!(stats.posted, 4);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn relay_timeout_moves_past_a_hung_request() {
    let h = harness_with_timeout(
        FakeTransport::default().hanging("stuck"),
        Some(Duration::from_millis(50)),
    );
    let stuck = h.dispatcher.add_action("stuck", none());
    let next = h.dispatcher.add_action("next", none());

    assert_eq!(stuck.await, ReceiptStatus::Failed);
    assert_eq!(next.await, ReceiptStatus::Posted);

    let errors = h.reporter.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("timed out"));
}

#[tokio::test]
async fn without_timeout_a_hung_request_holds_the_queue() {
    let h = harness(FakeTransport::default().hanging("stuck"));
    h.dispatcher.add_action("stuck", none());
    let next = h.dispatcher.add_action("next", none());

    let waited = tokio::time::timeout(Duration::from_millis(100), next).await;
    assert!(waited.is_err());
    assert_eq!(h.transport.sent_actions(), vec!["stuck"]);
}

// ---------------------------------------------------------------------------
// Shutdown / flush
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_drains_queued_actions() {
    let h = harness(FakeTransport::default().delay("a", 20).delay("b", 20));
    h.dispatcher.add_action("a", none());
    h.dispatcher.add_action("b", none());
    h.dispatcher.add_action("c", none());

    let stats = h.dispatcher.shutdown().await;
    assert_eq!(stats.posted, 3);
    assert_eq!(h.transport.sent_actions(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn flush_waits_for_earlier_actions_only() {
    let h = harness(FakeTransport::default().delay("a", 30));
    h.dispatcher.add_action("a", none());
    h.dispatcher.flush().await;
    assert_eq!(h.transport.sent_actions(), vec!["a"]);
    assert!(h.dispatcher.is_idle());
}

#[tokio::test]
async fn flush_ignores_actions_added_after_the_call() {
    let h = harness(FakeTransport::default().delay("a", 20).hanging("late"));
    let a = h.dispatcher.add_action("a", none());
    let flushed = h.dispatcher.flush();
    let late = h.dispatcher.add_action("late", none());

    let waited = tokio::time::timeout(Duration::from_secs(1), flushed).await;
    assert!(waited.is_ok(), "flush waited on an action added after it");
    assert_eq!(a.await, ReceiptStatus::Posted);

    // The later action is still stuck in its relay.
    assert!(!h.dispatcher.is_idle());
    let still = tokio::time::timeout(Duration::from_millis(50), late).await;
    assert!(still.is_err());
}

// ---------------------------------------------------------------------------
// End to end over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn http_failure_is_reported_and_chain_continues() {
    let mut server = mockito::Server::new_async().await;
    let fail_b = server
        .mock("POST", "/patient/action")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({ "action": "B" })))
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/patient/action")
        .match_body(mockito::Matcher::AnyOf(vec![
            mockito::Matcher::PartialJson(
                serde_json::json!({ "action": "A", "screen": "s".repeat(63) }),
            ),
            mockito::Matcher::PartialJson(
                serde_json::json!({ "action": "C", "extra": "e".repeat(127) }),
            ),
        ]))
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let reporter = Arc::new(RecordingReporter::default());
    let transport = Arc::new(HttpTransport::new(&server.url()).unwrap());
    let dispatcher = Dispatcher::builder(transport)
        .reporter(reporter.clone())
        .spawn();

    dispatcher.add_action("A", ActionOptions::default().screen("s".repeat(100)));
    dispatcher.add_action("B", none());
    dispatcher.add_action("C", ActionOptions::default().extra("e".repeat(200)));
    let stats = dispatcher.shutdown().await;

    fail_b.assert_async().await;
    ok.assert_async().await;
    assert_eq!(stats.posted, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(reporter.errors.lock().unwrap().len(), 1);
}
