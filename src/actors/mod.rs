//! Consumers of repository change events, plus the reachability monitor
//!
//! Each actor runs as an independent tokio task and owns its state; the
//! outside world talks to it through a cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!  user commands ──► HostRepository ──publish──► EventChannel
//!                         ▲                          │
//!                         │ bulk_update_status       ├──► ViewSyncActor ───► ViewSink
//!                         │                          ├──► AggregateActor ──► watch<AggregateSnapshot>
//!                   MonitorActor                     ├──► PersistenceActor ► SnapshotStore
//!                         ▲                          └──► ProbeListActor
//!                         │ set_targets                        │
//!                         └────────────────────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Events**: every consumer owns an unbounded subscription to the event channel
//! 2. **Commands**: each actor has an mpsc command channel for control messages
//! 3. **Request/Response**: oneshot channels for synchronous queries
//! 4. **Coalescing**: consumers batch their downstream work with a `CoalescingWindow`

pub mod aggregate;
pub mod messages;
pub mod monitor;
pub mod persistence;
pub mod probe_list;
pub mod view_sync;
