//! Dashboard session lifecycle.
//!
//! A [`Session`] sits between the host's message stream and the telemetry
//! store. It has two states:
//!
//! - `Uninitialized` — no `configure` message seen yet; samples and counters
//!   are logged and dropped.
//! - `Active` — a store exists and receives every `data` / `program-counter`
//!   message. A further `configure` tears the store down and starts a fresh one.
//!
//! Run status (`stopped` / `continued` / `terminated`) is recorded for chart
//! components but never stops ingestion: a paused chart still finds the full
//! record when it resumes.

use serde::{Deserialize, Serialize};

use crate::protocol::{GraphConfig, Message, ProtocolError, RunStatus};
use crate::sample::{Sample, Timestamp, now_millis};
use crate::store::{StoreConfig, TelemetryStore};

// ---------------------------------------------------------------------------
// State and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Applied to the session or its store.
    Applied,
    /// Understood, but has no effect here (`init`).
    Ignored,
    /// Malformed, or arrived before configuration. Logged and counted.
    Dropped,
}

/// A run-status change, kept so charts can annotate pause/resume points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMarker {
    pub timestamp: Timestamp,
    pub status: RunStatus,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    config: StoreConfig,
    store: Option<TelemetryStore>,
    graphs: Vec<GraphConfig>,
    status: RunStatus,
    markers: Vec<StatusMarker>,
    dropped: u64,
}

impl Session {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: None,
            graphs: Vec::new(),
            status: RunStatus::default(),
            markers: Vec::new(),
            dropped: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.store.is_some() {
            SessionState::Active
        } else {
            SessionState::Uninitialized
        }
    }

    pub fn store(&self) -> Option<&TelemetryStore> {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> Option<&mut TelemetryStore> {
        self.store.as_mut()
    }

    /// Graphs named by the latest `configure` message.
    pub fn graphs(&self) -> &[GraphConfig] {
        &self.graphs
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Status changes since the session was configured, oldest first.
    pub fn markers(&self) -> &[StatusMarker] {
        &self.markers
    }

    /// Messages dropped over the session's lifetime.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    /// Start a fresh store, discarding the previous one with all of its
    /// channels, counters and subscriptions.
    pub fn configure(
        &mut self,
        graphs: Vec<GraphConfig>,
        status: RunStatus,
        at: Timestamp,
    ) -> &mut TelemetryStore {
        if let Some(old) = self.store.take() {
            log::info!(
                "reconfiguring: tearing down store {} ({} channels)",
                old.session_id(),
                old.channel_count()
            );
        }

        let mut store = TelemetryStore::new(self.config.clone());
        for graph in &graphs {
            for id in graph.channel_ids() {
                store.declare_channel(id);
            }
        }
        log::info!(
            "store {} configured: {} graphs, {} channels, status {status}",
            store.session_id(),
            graphs.len(),
            store.channel_count()
        );

        self.graphs = graphs;
        self.status = status;
        self.markers = vec![StatusMarker {
            timestamp: at,
            status,
        }];
        self.store.insert(store)
    }

    /// Tear down the store. The session returns to `Uninitialized`.
    pub fn close(&mut self) {
        if let Some(store) = self.store.take() {
            log::info!("store {} closed", store.session_id());
        }
        self.graphs.clear();
        self.markers.clear();
        self.status = RunStatus::default();
    }

    /// Decode and apply one message, stamping missing timestamps with now.
    pub fn handle_line(&mut self, line: &str) -> Disposition {
        self.handle_line_at(line, now_millis())
    }

    pub fn handle_line_at(&mut self, line: &str, received_at: Timestamp) -> Disposition {
        match Message::decode(line) {
            Ok(message) => self.handle_at(message, received_at),
            Err(e) => self.drop_message(&e),
        }
    }

    pub fn handle(&mut self, message: Message) -> Disposition {
        self.handle_at(message, now_millis())
    }

    /// Apply `message` as if it arrived at `received_at`.
    pub fn handle_at(&mut self, message: Message, received_at: Timestamp) -> Disposition {
        match message {
            Message::Configure { graphs, status } => {
                self.configure(graphs, status, received_at);
                Disposition::Applied
            }
            Message::Data {
                id,
                data,
                timestamp,
            } => {
                let Some(timestamp) = self.resolve_timestamp("data", timestamp, received_at)
                else {
                    return self.drop_message(&ProtocolError::MissingTimestamp { kind: "data" });
                };
                match self.store.as_mut() {
                    Some(store) => {
                        store.dispatch_sample(&id, Sample::new(timestamp, data));
                        Disposition::Applied
                    }
                    None => self.drop_unconfigured("data"),
                }
            }
            Message::ProgramCounter {
                function,
                counter: address,
                timestamp,
            } => {
                if self
                    .resolve_timestamp("program-counter", timestamp, received_at)
                    .is_none()
                {
                    return self.drop_message(&ProtocolError::MissingTimestamp {
                        kind: "program-counter",
                    });
                }
                match self.store.as_mut() {
                    Some(store) => {
                        // `counter` is the sampled PC; each message is one hit.
                        log::trace!("pc sample {address:#010x} in {function}");
                        store.dispatch_counter_increment(&function, 1);
                        Disposition::Applied
                    }
                    None => self.drop_unconfigured("program-counter"),
                }
            }
            Message::Status { status, timestamp } => {
                self.status = status;
                self.markers.push(StatusMarker {
                    timestamp: timestamp.unwrap_or(received_at),
                    status,
                });
                log::debug!("run status -> {status}");
                Disposition::Applied
            }
            Message::Init { .. } => Disposition::Ignored,
            Message::History { messages } => {
                log::debug!("replaying {} buffered messages", messages.len());
                for inner in messages {
                    self.handle_at(inner, received_at);
                }
                Disposition::Applied
            }
        }
    }

    fn resolve_timestamp(
        &self,
        kind: &'static str,
        timestamp: Option<Timestamp>,
        received_at: Timestamp,
    ) -> Option<Timestamp> {
        match timestamp {
            Some(ts) => Some(ts),
            None if self.config.stamp_missing_timestamps => {
                log::trace!("{kind} message without timestamp, stamping {received_at}");
                Some(received_at)
            }
            None => None,
        }
    }

    fn drop_message(&mut self, error: &ProtocolError) -> Disposition {
        self.dropped += 1;
        log::warn!("dropping message: {error}");
        Disposition::Dropped
    }

    fn drop_unconfigured(&mut self, kind: &str) -> Disposition {
        self.dropped += 1;
        log::warn!("dropping `{kind}` message received before configuration");
        Disposition::Dropped
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIGURE: &str = r#"{"type":"configure","status":"continued","graphs":[
        {"type":"realtime","label":"Temps","minimum":0,"maximum":100,
         "plots":[{"graphId":"t0","label":"t0","color":"red"}]},
        {"type":"x-y-plot","label":"Pos","xGraphId":"x","yGraphId":"y",
         "xMinimum":0,"xMaximum":1,"yMinimum":0,"yMaximum":1}]}"#;

    #[test]
    fn test_starts_uninitialized_and_drops_samples() {
        let mut session = Session::default();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(
            session.handle_line_at(r#"{"type":"data","id":"a","data":1}"#, 5),
            Disposition::Dropped
        );
        assert_eq!(
            session.handle_line_at(r#"{"type":"program-counter","function":"f","counter":1}"#, 5),
            Disposition::Dropped
        );
        assert_eq!(session.dropped_messages(), 2);
        assert!(session.store().is_none());
    }

    #[test]
    fn test_configure_activates_and_declares_channels() {
        let mut session = Session::default();
        assert_eq!(session.handle_line_at(CONFIGURE, 100), Disposition::Applied);
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.status(), RunStatus::Continued);
        assert_eq!(session.graphs().len(), 2);

        let store = session.store().unwrap();
        assert_eq!(store.channel_ids(), vec!["t0", "x", "y"]);
        assert_eq!(
            session.markers(),
            &[StatusMarker {
                timestamp: 100,
                status: RunStatus::Continued
            }]
        );
    }

    #[test]
    fn test_missing_timestamp_is_stamped_with_receipt_time() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        session.handle_line_at(r#"{"type":"data","id":"t0","data":2.5}"#, 1234);
        assert_eq!(
            session.store().unwrap().oldest("t0"),
            Some(Sample::new(1234, 2.5))
        );
    }

    #[test]
    fn test_strict_mode_drops_unstamped_messages() {
        let mut session = Session::new(StoreConfig {
            stamp_missing_timestamps: false,
            ..StoreConfig::default()
        });
        session.handle_line_at(CONFIGURE, 0);
        assert_eq!(
            session.handle_line_at(r#"{"type":"data","id":"t0","data":2.5}"#, 1234),
            Disposition::Dropped
        );
        assert_eq!(
            session.handle_line_at(r#"{"type":"data","id":"t0","data":2.5,"timestamp":9}"#, 1234),
            Disposition::Applied
        );
        assert_eq!(session.store().unwrap().channel("t0").unwrap().len(), 1);
    }

    #[test]
    fn test_status_changes_do_not_pause_ingestion() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        session.handle_line_at(r#"{"type":"status","status":"stopped"}"#, 10);
        session.handle_line_at(r#"{"type":"data","id":"t0","data":1,"timestamp":11}"#, 11);
        session.handle_line_at(r#"{"type":"status","status":"continued","timestamp":20}"#, 21);

        assert_eq!(session.status(), RunStatus::Continued);
        let statuses: Vec<(Timestamp, RunStatus)> = session
            .markers()
            .iter()
            .map(|m| (m.timestamp, m.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (0, RunStatus::Continued),
                (10, RunStatus::Stopped),
                (20, RunStatus::Continued),
            ]
        );
        assert_eq!(session.store().unwrap().channel("t0").unwrap().len(), 1);
    }

    #[test]
    fn test_reconfigure_replaces_store() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        session.handle_line_at(r#"{"type":"data","id":"extra","data":1,"timestamp":1}"#, 1);
        session.handle_line_at(r#"{"type":"program-counter","function":"f","counter":4}"#, 1);
        let first = session.store().unwrap().session_id();

        session.handle_line_at(CONFIGURE, 50);
        let store = session.store().unwrap();
        assert_ne!(store.session_id(), first);
        assert_eq!(store.channel_ids(), vec!["t0", "x", "y"]);
        assert!(store.counter_snapshot().is_empty());
        assert_eq!(session.markers().len(), 1);
    }

    #[test]
    fn test_history_replays_in_order() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        let batch = r#"{"type":"history","messages":[
            {"type":"data","id":"t0","data":1,"timestamp":1},
            {"type":"data","id":"t0","data":2,"timestamp":2},
            {"type":"program-counter","function":"main","counter":1,"timestamp":2},
            {"type":"program-counter","function":"main","counter":1,"timestamp":3}
        ]}"#;
        assert_eq!(session.handle_line_at(batch, 10), Disposition::Applied);

        let store = session.store().unwrap();
        assert_eq!(
            store.query("t0", 0, 10, false),
            vec![Sample::new(1, 1.0), Sample::new(2, 2.0)]
        );
        assert_eq!(store.counter_snapshot().get("main"), Some(2));
    }

    #[test]
    fn test_program_counter_messages_count_hits_not_addresses() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        for line in [
            r#"{"type":"program-counter","function":"main","counter":134218292,"timestamp":1}"#,
            r#"{"type":"program-counter","function":"main","counter":134218300,"timestamp":2}"#,
            r#"{"type":"program-counter","function":"SysTick_Handler","counter":134219000,"timestamp":3}"#,
        ] {
            assert_eq!(session.handle_line_at(line, 5), Disposition::Applied);
        }

        let snapshot = session.store().unwrap().counter_snapshot();
        assert_eq!(snapshot.get("main"), Some(2));
        assert_eq!(snapshot.get("SysTick_Handler"), Some(1));
        assert_eq!(snapshot.total(), 3);
    }

    #[test]
    fn test_garbage_and_init_do_not_disturb_channels() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        session.handle_line_at(r#"{"type":"data","id":"t0","data":1,"timestamp":1}"#, 1);

        assert_eq!(session.handle_line_at("{oops", 2), Disposition::Dropped);
        assert_eq!(
            session.handle_line_at(r#"{"type":"telemetry"}"#, 2),
            Disposition::Dropped
        );
        assert_eq!(
            session.handle_line_at(r#"{"type":"init"}"#, 2),
            Disposition::Ignored
        );
        assert_eq!(session.dropped_messages(), 2);
        assert_eq!(session.store().unwrap().channel("t0").unwrap().len(), 1);
    }

    #[test]
    fn test_close_returns_to_uninitialized() {
        let mut session = Session::default();
        session.handle_line_at(CONFIGURE, 0);
        session.close();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.graphs().is_empty());
        assert!(session.markers().is_empty());
    }
}
