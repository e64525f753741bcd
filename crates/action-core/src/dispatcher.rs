use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::DispatcherConfig;
use crate::record::{ActionOptions, ActionRecord};
use crate::sink::{AnalyticsSink, ErrorReporter, TracingReporter, TracingSink};
use crate::transport::{with_deadline, ActionTransport, HttpTransport};
use crate::{ActionError, Result};

// ─── ReceiptStatus / ActionReceipt ────────────────────────────────────────

/// Outcome of one relay attempt, as seen by whoever kept the receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// The endpoint accepted the action.
    Posted,
    /// The relay was attempted and failed; the error went to the reporter.
    Failed,
    /// The action never reached the worker (dispatcher shut down).
    Dropped,
}

/// Resolves once the relay attempt for one action has finished.
///
/// Awaiting is optional. Dropping the receipt does not cancel the relay and
/// does not affect ordering.
#[derive(Debug)]
pub struct ActionReceipt {
    rx: Option<oneshot::Receiver<ReceiptStatus>>,
}

impl ActionReceipt {
    fn dropped() -> Self {
        Self { rx: None }
    }
}

impl Future for ActionReceipt {
    type Output = ReceiptStatus;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            None => Poll::Ready(ReceiptStatus::Dropped),
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|r| r.unwrap_or(ReceiptStatus::Dropped)),
        }
    }
}

// ─── DispatcherStats ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub enqueued: u64,
    pub posted: u64,
    pub failed: u64,
    /// Queued or in flight.
    pub pending: usize,
}

#[derive(Default)]
struct Counters {
    pending: AtomicUsize,
    enqueued: AtomicU64,
    posted: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn finish(&self, status: ReceiptStatus) {
        match status {
            ReceiptStatus::Posted => self.posted.fetch_add(1, Ordering::SeqCst),
            _ => self.failed.fetch_add(1, Ordering::SeqCst),
        };
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            posted: self.posted.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

enum Envelope {
    Action {
        record: ActionRecord,
        done: oneshot::Sender<ReceiptStatus>,
    },
    Flush(oneshot::Sender<()>),
}

// ─── Dispatcher ───────────────────────────────────────────────────────────

/// Order-preserving, fire-and-forget relay of actions to the backend.
///
/// ```text
/// add_action ──▶ unbounded FIFO ──▶ worker task ──▶ relay (await) ──▶ next
/// ```
///
/// `add_action` never suspends: it stamps the record and pushes it onto the
/// queue. A single worker pulls records one at a time and awaits each relay
/// before pulling the next, so relay attempts begin in submission order
/// regardless of how long any request takes or whether it fails.
///
/// The dispatcher is `Send + Sync`; concurrent callers are serialised by the
/// channel. Dropping it without [`Dispatcher::shutdown`] lets the worker
/// drain what is already queued in the background.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    counters: Arc<Counters>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn a dispatcher on the current tokio runtime.
    pub fn new(
        transport: Arc<dyn ActionTransport>,
        sink: Arc<dyn AnalyticsSink>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self::builder(transport).sink(sink).reporter(reporter).spawn()
    }

    pub fn builder(transport: Arc<dyn ActionTransport>) -> DispatcherBuilder {
        DispatcherBuilder {
            transport,
            sink: None,
            reporter: Arc::new(TracingReporter),
            relay_timeout: None,
        }
    }

    /// HTTP transport, tracing sink (unless disabled) and tracing reporter,
    /// all wired from `config`.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        let mut builder = Self::builder(Arc::new(transport)).relay_timeout(config.relay_timeout());
        if config.track_locally {
            builder = builder.sink(Arc::new(TracingSink));
        }
        Ok(builder.spawn())
    }

    /// Record an action now and queue it for relay.
    pub fn add_action(&self, name: impl Into<String>, opts: ActionOptions) -> ActionReceipt {
        self.enqueue(ActionRecord::new(name, opts))
    }

    /// Queue a prebuilt record. Its timestamp is left untouched.
    pub fn enqueue(&self, record: ActionRecord) -> ActionReceipt {
        let (done, rx) = oneshot::channel();
        // Count before sending so the worker's updates can never run first.
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(Envelope::Action { record, done }) {
            Ok(()) => ActionReceipt { rx: Some(rx) },
            Err(mpsc::error::SendError(envelope)) => {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                self.counters.enqueued.fetch_sub(1, Ordering::SeqCst);
                if let Envelope::Action { record, .. } = envelope {
                    tracing::warn!(action = %record.name, "dispatcher stopped; action dropped");
                }
                ActionReceipt::dropped()
            }
        }
    }

    /// Wait until every action queued before this call has been relayed.
    ///
    /// The marker is queued when `flush` is called, not when the returned
    /// future is first polled, so actions added in between are not waited on.
    pub fn flush(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let queued = self.tx.send(Envelope::Flush(tx)).is_ok();
        async move {
            if queued {
                let _ = rx.await;
            }
        }
    }

    /// `true` when nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.counters.pending.load(Ordering::SeqCst) == 0
    }

    pub fn stats(&self) -> DispatcherStats {
        self.counters.snapshot()
    }

    /// Close the queue, relay everything still pending, and join the worker.
    pub async fn shutdown(self) -> DispatcherStats {
        let Dispatcher {
            tx,
            counters,
            worker,
        } = self;
        drop(tx);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "action worker exited abnormally");
        }
        counters.snapshot()
    }
}

// ─── DispatcherBuilder ────────────────────────────────────────────────────

pub struct DispatcherBuilder {
    transport: Arc<dyn ActionTransport>,
    sink: Option<Arc<dyn AnalyticsSink>>,
    reporter: Arc<dyn ErrorReporter>,
    relay_timeout: Option<Duration>,
}

impl DispatcherBuilder {
    pub fn sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Bound each relay. `None` (the default) waits as long as the transport does.
    pub fn relay_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Start the worker task. Must be called from inside a tokio runtime.
    pub fn spawn(self) -> Dispatcher {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let relay = Relay {
            transport: self.transport,
            sink: self.sink,
            reporter: self.reporter,
            timeout: self.relay_timeout,
        };
        let worker = tokio::spawn(run_worker(rx, relay, Arc::clone(&counters)));
        Dispatcher {
            tx,
            counters,
            worker,
        }
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    relay: Relay,
    counters: Arc<Counters>,
) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Action { record, done } => {
                let status = relay.relay(&record).await;
                counters.finish(status);
                // The caller may have dropped the receipt.
                let _ = done.send(status);
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("action queue closed; worker exiting");
}

struct Relay {
    transport: Arc<dyn ActionTransport>,
    sink: Option<Arc<dyn AnalyticsSink>>,
    reporter: Arc<dyn ErrorReporter>,
    timeout: Option<Duration>,
}

impl Relay {
    /// One relay attempt. Never retries and never fails the worker: every
    /// outcome, including a panicking transport, maps to a status. A panicking
    /// sink is logged and the POST still goes out.
    async fn relay(&self, record: &ActionRecord) -> ReceiptStatus {
        let payload = record.payload();

        if let Some(sink) = &self.sink {
            let properties = record.track_properties();
            let tracked = std::panic::catch_unwind(AssertUnwindSafe(|| {
                sink.track(&record.name, &properties)
            }));
            if let Err(panic) = tracked {
                tracing::warn!(
                    action = %record.name,
                    panic = %panic_message(&*panic),
                    "analytics sink panicked"
                );
            }
        }

        let send = with_deadline(self.timeout, self.transport.post_action(&payload));
        let result = match AssertUnwindSafe(send).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ActionError::Panicked(panic_message(&*panic))),
        };

        match result {
            Ok(()) => {
                tracing::debug!(action = %record.name, "action recorded");
                ReceiptStatus::Posted
            }
            Err(e) => {
                tracing::warn!(action = %record.name, error = %e, "failed to record action");
                self.reporter.capture_exception(&e);
                ReceiptStatus::Failed
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// ─── Tests ────────────────────────────────────────────────────────────────
