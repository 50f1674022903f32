//! netwatch: long-running network health monitor
//!
//! Every cycle probes the local address, echo reachability, DNS, the primary
//! HTTP(S) host, captive-portal endpoints and interface throughput, reduces
//! them to one `Classification`, tracks cumulative downtime, and writes both
//! an append-only event log and a JSON status snapshot.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod downtime;
pub mod engine;
pub mod error;
pub mod models;
pub mod presenter;
pub mod prober;
pub mod reachability;
pub mod sinks;
pub mod throughput;
pub mod utils;

pub use aggregator::classify;
pub use config::MonitorConfig;
pub use downtime::{DowntimeTracker, Session};
pub use engine::{LoopState, Monitor};
pub use error::{MonitorError, MonitorResult};
pub use models::{CheckResult, CheckSet, Classification, CycleState, DowntimeInterval, ProbeDetail, ThroughputSample};
pub use presenter::{ConsoleSummary, Presenter, StatusBoard};
pub use prober::{CheckSource, Prober};
pub use sinks::{EventLog, SessionGuard, SnapshotFile};
