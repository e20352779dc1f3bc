//! hb-orchestrator: the harbor service orchestrator
//!
//! The orchestrator is the hub:
//! - [`reclaim`] frees configured ports from stale processes
//! - [`supervisor`] starts services in dependency order and keeps them healthy
//! - [`policy`] classifies outbound destinations
//! - [`watcher`] polls files and reacts to changes
//! - [`harness`] runs named scenarios and produces a report
//! - [`ipc`] exposes all of it to the CLI over localhost TCP

pub mod harness;
pub mod health;
pub mod ipc;
pub mod policy;
pub mod reclaim;
pub mod state;
pub mod supervisor;
pub mod watcher;

pub use health::HttpProbe;
pub use policy::PolicyMatcher;
pub use reclaim::{PortReclaimer, ReclaimOutcome};
pub use state::HarborState;
pub use supervisor::Orchestrator;
pub use watcher::{ConfigWatcher, WatchedFile};
