//! # tracegraph-core
//!
//! **The data layer behind a live trace dashboard.**
//!
//! A debug host streams timestamped samples (one named channel per plotted
//! value) and per-function program-counter hits. `tracegraph-core` keeps the
//! full history of every channel, answers the bounded-range and overview
//! queries a chart needs on every animation frame, and fans each new sample out
//! to listeners in arrival order.
//!
//! ## Quick Start
//!
//! ```
//! use tracegraph_core::{Deferred, Sample, TelemetryStore};
//!
//! let mut store = TelemetryStore::default();
//!
//! // Listeners may register before any data arrives.
//! store.subscribe("A", |s: &Sample, _: &mut Deferred| {
//!     println!("A <- {} @ {}", s.value, s.timestamp);
//! });
//!
//! store.dispatch_sample("A", Sample::new(0, 1.0));
//! store.dispatch_sample("A", Sample::new(10, 2.0));
//! store.dispatch_sample("A", Sample::new(20, 3.0));
//!
//! // Clamped queries flat-extend the line to the window edges.
//! let window = store.query("A", 5, 15, true);
//! assert_eq!(
//!     window,
//!     vec![Sample::new(5, 1.0), Sample::new(10, 2.0), Sample::new(15, 2.0)]
//! );
//!
//! store.dispatch_counter_increment("main", 3);
//! store.dispatch_counter_increment("main", 2);
//! assert_eq!(store.counter_snapshot().get("main"), Some(5));
//! ```
//!
//! ## Architecture
//!
//! Host message → [`Session`] → [`TelemetryStore`] → [`Channel::append`] →
//! synchronous listener fan-out.
//!
//! Charts read through the store: [`TelemetryStore::query`] for the visible
//! window, [`TelemetryStore::overview`] for a pixel-budget view of the whole
//! history, [`TelemetryStore::counter_snapshot`] for distribution charts.
//!
//! Everything is single-threaded and never blocks. Listeners that want to
//! mutate the store do so through [`Deferred`], which the store drains once
//! the current fan-out is complete.

pub mod channel;
pub mod counters;
pub mod downsample;
pub mod protocol;
pub mod sample;
pub mod session;
pub mod store;
pub mod subscription;

pub use channel::Channel;
pub use counters::{CounterSnapshot, CounterTable};
pub use downsample::{downsample, downsample_sorted};
pub use protocol::{GraphConfig, Message, PlotConfig, ProtocolError, RealtimeGraph, RunStatus, XyGraph};
pub use sample::{CounterIncrement, Sample, Timestamp, now_millis};
pub use session::{Disposition, Session, SessionState, StatusMarker};
pub use store::{DEFAULT_REENTRANCY_LIMIT, StoreConfig, TelemetryStore};
pub use subscription::{Deferred, DeferredOp, Listener, ListenerRegistry, SubscriptionId};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
