//! `tracegraph follow` — live view of samples as they are delivered to listeners.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use tracegraph_core::{Deferred, Sample, Session, StoreConfig};

pub fn run(channel_filter: Option<&str>, config: StoreConfig) {
    let requested = channel_filter.map(super::parse_channels);
    let mut session = Session::new(config);
    let stdout = io::stdout();

    if let Err(e) = follow(&mut session, io::stdin().lock(), requested.as_deref(), move |line| {
        let mut out = stdout.lock();
        writeln!(out, "{line}").and_then(|()| out.flush())
    }) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    eprintln!("{} messages dropped", session.dropped_messages());
}

/// Feed `reader` into `session`, subscribing `emit` to the chosen channels of
/// every store the session configures. `emit` receives one JSON line per sample.
pub fn follow<F>(
    session: &mut Session,
    reader: impl BufRead,
    channels: Option<&[String]>,
    emit: F,
) -> io::Result<()>
where
    F: FnMut(&str) -> io::Result<()> + 'static,
{
    let emit = Rc::new(RefCell::new(emit));
    let failed: Rc<RefCell<Option<io::Error>>> = Rc::default();
    let mut watched_store = None;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        session.handle_line(&line);

        let Some(store) = session.store_mut() else {
            continue;
        };
        if watched_store == Some(store.session_id()) {
            if let Some(e) = failed.borrow_mut().take() {
                return Err(e);
            }
            continue;
        }

        // New store: subscribe to the requested channels, or all configured ones.
        watched_store = Some(store.session_id());
        let targets: Vec<String> = match channels {
            Some(ids) => ids.to_vec(),
            None => store.channel_ids().into_iter().map(str::to_string).collect(),
        };
        log::info!("following {} channels: {}", targets.len(), targets.join(", "));

        for id in targets {
            let emit = Rc::clone(&emit);
            let failed = Rc::clone(&failed);
            let channel = id.clone();
            store.subscribe(&id, move |s: &Sample, d: &mut Deferred| {
                let line = serde_json::json!({
                    "channel": channel,
                    "timestamp": s.timestamp,
                    "value": s.value,
                })
                .to_string();
                if let Err(e) = (&mut *emit.borrow_mut())(&line) {
                    *failed.borrow_mut() = Some(e);
                    d.unsubscribe_self();
                }
            });
        }
    }

    match failed.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
