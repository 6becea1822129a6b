//! `tracegraph replay` — feed a recorded message stream into a session and report.

use std::io::{self, BufRead};

use tracegraph_core::{Disposition, Session, StoreConfig, TelemetryStore};

/// Replay command options.
pub struct ReplayCommandConfig<'a> {
    pub input: &'a str,
    pub channel: Option<&'a str>,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub clamp: bool,
    pub overview_width: Option<usize>,
    pub output_path: Option<&'a str>,
    pub store: StoreConfig,
}

/// Per-disposition message counts from one ingest pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub applied: u64,
    pub ignored: u64,
    pub dropped: u64,
}

pub fn run(cfg: ReplayCommandConfig<'_>) {
    let reader = match super::open_input(cfg.input) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error opening {}: {e}", cfg.input);
            std::process::exit(1);
        }
    };

    let mut session = Session::new(cfg.store.clone());
    let stats = match ingest(&mut session, reader) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cfg.input);
            std::process::exit(1);
        }
    };
    log::info!(
        "replayed {} lines: {} applied, {} ignored, {} dropped",
        stats.lines,
        stats.applied,
        stats.ignored,
        stats.dropped
    );

    let report = build_report(&session, &cfg, stats);
    let json = match serde_json::to_string_pretty(&report) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error encoding report: {e}");
            std::process::exit(1);
        }
    };

    match cfg.output_path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json + "\n") {
                eprintln!("Error writing {path}: {e}");
                std::process::exit(1);
            }
            eprintln!("Report written to {path}");
        }
        None => println!("{json}"),
    }
}

/// Apply every non-blank line of `reader` to `session`.
pub fn ingest(session: &mut Session, reader: impl BufRead) -> io::Result<IngestStats> {
    let mut stats = IngestStats::default();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;
        match session.handle_line(&line) {
            Disposition::Applied => stats.applied += 1,
            Disposition::Ignored => stats.ignored += 1,
            Disposition::Dropped => stats.dropped += 1,
        }
    }
    Ok(stats)
}

/// Summarize the session as JSON: channels, optional query/overview, counters, markers.
pub fn build_report(
    session: &Session,
    cfg: &ReplayCommandConfig<'_>,
    stats: IngestStats,
) -> serde_json::Value {
    let Some(store) = session.store() else {
        return serde_json::json!({
            "state": "uninitialized",
            "lines": stats.lines,
            "dropped": session.dropped_messages(),
        });
    };

    let channels: Vec<serde_json::Value> = store
        .channel_ids()
        .into_iter()
        .filter_map(|id| store.channel(id))
        .map(|ch| {
            serde_json::json!({
                "id": ch.id(),
                "samples": ch.len(),
                "time_ordered": ch.is_time_ordered(),
                "oldest": ch.oldest(),
                "latest": ch.latest(),
                "time_bounds": ch.time_bounds(),
            })
        })
        .collect();

    let mut report = serde_json::json!({
        "state": "active",
        "store": store.session_id().to_string(),
        "status": session.status(),
        "lines": stats.lines,
        "applied": stats.applied,
        "ignored": stats.ignored,
        "dropped": session.dropped_messages(),
        "graphs": session.graphs(),
        "channels": channels,
        "counters": store.counter_snapshot(),
        "markers": session.markers(),
    });

    if let Some(channel) = cfg.channel {
        report["query"] = channel_query(store, channel, cfg);
    }
    report
}

fn channel_query(
    store: &TelemetryStore,
    channel: &str,
    cfg: &ReplayCommandConfig<'_>,
) -> serde_json::Value {
    let bounds = store.channel(channel).and_then(|ch| ch.time_bounds());
    let from = cfg.from.or(bounds.map(|b| b.0)).unwrap_or(0);
    let to = cfg.to.or(bounds.map(|b| b.1)).unwrap_or(from);

    let mut query = serde_json::json!({
        "channel": channel,
        "from": from,
        "to": to,
        "clamp": cfg.clamp,
        "samples": store.query(channel, from, to, cfg.clamp),
    });
    if let Some(width) = cfg.overview_width {
        // Overview windows are half-open; widen by one so `to` itself is covered.
        query["overview"] = serde_json::json!({
            "width": width,
            "samples": store.overview(channel, width, from, to.saturating_add(1)),
        });
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(channel: Option<&str>) -> ReplayCommandConfig<'_> {
        ReplayCommandConfig {
            input: "-",
            channel,
            from: None,
            to: None,
            clamp: false,
            overview_width: None,
            output_path: None,
            store: StoreConfig::default(),
        }
    }

    const STREAM: &str = r#"{"type":"init"}
{"type":"configure","status":"continued","graphs":[{"type":"realtime","label":"A","minimum":0,"maximum":5,"plots":[{"graphId":"A","label":"A","color":"blue"}]}]}
{"type":"data","id":"A","data":1,"timestamp":0}

{"type":"data","id":"A","data":2,"timestamp":10}
{"type":"data","id":"A","data":3,"timestamp":20}
{"type":"program-counter","function":"foo","counter":134218292,"timestamp":20}
{"type":"program-counter","function":"foo","counter":134218300,"timestamp":21}
not json at all
{"type":"status","status":"stopped","timestamp":30}
"#;

    #[test]
    fn test_ingest_counts_dispositions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STREAM.as_bytes()).unwrap();

        let reader = super::super::open_input(file.path().to_str().unwrap()).unwrap();
        let mut session = Session::default();
        let stats = ingest(&mut session, reader).unwrap();

        assert_eq!(
            stats,
            IngestStats {
                lines: 9,
                applied: 7,
                ignored: 1,
                dropped: 1,
            }
        );
        assert_eq!(
            session.store().unwrap().counter_snapshot().get("foo"),
            Some(2)
        );
    }

    #[test]
    fn test_report_includes_clamped_query_and_overview() {
        let mut session = Session::default();
        let stats = ingest(&mut session, STREAM.as_bytes()).unwrap();

        let mut cfg = config(Some("A"));
        cfg.from = Some(5);
        cfg.to = Some(15);
        cfg.clamp = true;
        cfg.overview_width = Some(2);
        let report = build_report(&session, &cfg, stats);

        assert_eq!(report["state"], "active");
        assert_eq!(report["status"], "stopped");
        assert_eq!(report["counters"]["foo"], 2);
        assert_eq!(report["channels"][0]["samples"], 3);
        assert_eq!(
            report["query"]["samples"],
            serde_json::json!([
                {"timestamp": 5, "value": 1.0},
                {"timestamp": 10, "value": 2.0},
                {"timestamp": 15, "value": 2.0},
            ])
        );
        // Only one real sample in [5, 16): returned as-is.
        assert_eq!(
            report["query"]["overview"]["samples"],
            serde_json::json!([{"timestamp": 10, "value": 2.0}])
        );
        assert_eq!(report["markers"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_query_window_defaults_to_channel_bounds() {
        let mut session = Session::default();
        let stats = ingest(&mut session, STREAM.as_bytes()).unwrap();
        let report = build_report(&session, &config(Some("A")), stats);

        assert_eq!(report["query"]["from"], 0);
        assert_eq!(report["query"]["to"], 20);
        assert_eq!(report["query"]["samples"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_unknown_channel_query_is_empty() {
        let mut session = Session::default();
        let stats = ingest(&mut session, STREAM.as_bytes()).unwrap();
        let report = build_report(&session, &config(Some("nope")), stats);
        assert_eq!(report["query"]["samples"], serde_json::json!([]));
    }

    #[test]
    fn test_unconfigured_stream_reports_uninitialized() {
        let mut session = Session::default();
        let stream = r#"{"type":"data","id":"A","data":1,"timestamp":0}"#;
        let stats = ingest(&mut session, stream.as_bytes()).unwrap();
        let report = build_report(&session, &config(None), stats);

        assert_eq!(report["state"], "uninitialized");
        assert_eq!(report["dropped"], 1);
    }
}
