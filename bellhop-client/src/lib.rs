//! Order notification and tracking pipeline for a storefront client.
//!
//! # Architecture
//!
//! ```text
//!                 ┌────────────┐   push    ┌──────────────────┐
//!  change feed ──►│ subscriber │──────────►│                  │──► unread count
//!  (SSE/memory)   └────────────┘           │  session reducer │──► ringing/badge
//!                 ┌────────────┐   poll    │  (single writer) │──► feed status
//!  data store ───►│ safety net │──────────►│                  │──► warnings
//!  (REST/memory)  └────────────┘           └───────┬──────────┘
//!                                                  │
//!                              ┌───────────────────┼────────────────┐
//!                              ▼                   ▼                ▼
//!                        reconciliation      alert engine     agent bridge
//!                        (3-tier ownership)  (chime chain)    (background)
//! ```
//!
//! The push subscription is the latency path and the timer poll is the
//! correctness path; both funnel into one reducer whose merges are
//! idempotent, so their overlap needs no coordination.

pub mod ack;
pub mod alert;
pub mod chime;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod identity;
pub mod logger;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod store;
pub mod subscriber;
pub mod tasks;

pub use ack::AckHandle;
pub use alert::{AlertEngine, AlertPhase, AlertState};
pub use chime::{Chime, ChimeChain, ClipChime, SynthChime};
pub use config::SessionConfig;
pub use error::{PipelineError, PipelineResult};
pub use feed::{ChangeFeed, FeedSubscription, MemoryFeed, SseFeed};
pub use http::RestStore;
pub use identity::IdentityResolver;
pub use reconcile::{MergeOutcome, NotificationSet, OrderSet, ReconciliationEngine, Viewer};
pub use retry::{InstantScheduler, RetryPolicy, Scheduler, TokioScheduler};
pub use session::{NotifySession, SessionBuilder};
pub use store::{DataStore, MemoryStore};
pub use subscriber::{ChangeFeedSubscriber, FeedInput, FeedStatus};
pub use tasks::{SessionTasks, TaskKind};
