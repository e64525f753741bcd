//! `action-core`: order-preserving relay of analytics actions.
//!
//! UI code records discrete events ("actions") and hands them to a
//! [`Dispatcher`]. Each action is POSTed to `{api_root}/patient/action`, one
//! at a time, in the order the actions were added. A failed relay is logged,
//! reported, and skipped; it never blocks the actions behind it and never
//! reaches the caller.
//!
//! # Architecture
//!
//! ```text
//! ActionRecord     ← name + context, timestamp fixed at creation
//!     │
//!     ▼
//! Dispatcher       ← add_action(): sync, pushes onto an mpsc FIFO
//!     │
//!     ▼
//! worker task      ← pulls one record, relays it, awaits, pulls the next
//!     │
//!     ├─▶ AnalyticsSink::track      (best effort, not awaited)
//!     ├─▶ ActionTransport::post_action  (HttpTransport: reqwest)
//!     └─▶ ErrorReporter::capture_exception  (on failure only)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use action_core::{ActionOptions, Dispatcher, DispatcherConfig};
//!
//! let dispatcher = Dispatcher::from_config(&DispatcherConfig::default())?;
//! dispatcher.add_action("screen_view", ActionOptions::default().screen("intake"));
//! dispatcher.add_action("question_answered", ActionOptions::default().section_uid("phq9"));
//! dispatcher.shutdown().await;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod record;
pub mod sink;
pub mod transport;

pub use config::{ConfigWarning, DispatcherConfig, WarnLevel};
pub use dispatcher::{
    ActionReceipt, Dispatcher, DispatcherBuilder, DispatcherStats, ReceiptStatus,
};
pub use error::{ActionError, Result};
pub use record::{ActionOptions, ActionPayload, ActionRecord, KnownAction};
pub use sink::{AnalyticsSink, ErrorReporter, NoopSink, TracingReporter, TracingSink};
pub use transport::{ActionTransport, HttpTransport};
