//! File watching and live reload.
//!
//! Watch subscriptions map a change pattern to a reaction: stylesheet
//! sources re-run the style task and push an injected style refresh to
//! connected clients, markup and script changes push a full reload.
//! Reactions are handled sequentially on the debouncer loop, so two
//! watch-triggered rebuilds never overlap.

use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8PathBuf;
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tungstenite::WebSocket;

use crate::error::WatchError;
use crate::task::Orchestrator;
use crate::{Session, TASK_SASS};

/// What connected clients are told after a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reload {
    /// Full page reload.
    Full,
    /// In-place stylesheet refresh, no page reload.
    Styles,
}

impl Reload {
    fn message(self) -> &'static str {
        match self {
            Reload::Full => "reload",
            Reload::Styles => "refresh",
        }
    }
}

enum Reaction {
    /// Re-run a task by name, then notify clients on success.
    Rebuild(&'static str, Reload),
    /// Notify clients without rebuilding anything.
    Notify(Reload),
}

struct Subscription {
    pattern: Pattern,
    reaction: Reaction,
}

/// Websocket broadcast half of the dev session. Lives for the whole
/// process, clients connect from the script served by the dev server.
pub struct LiveReload {
    tx: Sender<Reload>,
    pub port: u16,
}

impl LiveReload {
    pub fn start() -> Result<Self, WatchError> {
        let (tcp, port) = reserve_port()?;
        let clients = Arc::new(Mutex::new(vec![]));

        new_thread_ws_incoming(tcp, clients.clone());
        let tx = new_thread_ws_broadcast(clients);

        Ok(Self { tx, port })
    }

    pub fn send(&self, kind: Reload) {
        // The broadcast thread never exits before the process does.
        let _ = self.tx.send(kind);
    }
}

/// Watch the source tree until the process is interrupted.
///
/// Each filesystem event batch is matched against the subscriptions in
/// order; every matching subscription fires once per batch. A failing
/// rebuild is reported and watching continues.
pub fn watch(
    session: &Session,
    orchestrator: &Orchestrator<Session>,
    live: &LiveReload,
) -> Result<(), WatchError> {
    let app = session.paths.app.canonicalize_utf8()?;

    let subscriptions = [
        Subscription {
            pattern: Pattern::new(app.join("sass/**/*.scss").as_str())?,
            reaction: Reaction::Rebuild(TASK_SASS, Reload::Styles),
        },
        Subscription {
            pattern: Pattern::new(app.join("*.html").as_str())?,
            reaction: Reaction::Notify(Reload::Full),
        },
        Subscription {
            pattern: Pattern::new(app.join("js/**/*.js").as_str())?,
            reaction: Reaction::Notify(Reload::Full),
        },
    ];

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(250), None, tx)?;
    debouncer.watch(Path::new(app.as_str()), RecursiveMode::Recursive)?;

    eprintln!("Watching {app} for changes");

    loop {
        let changed = debounced_paths(rx.recv()?);
        if changed.is_empty() {
            continue;
        }

        for sub in &subscriptions {
            if !changed.iter().any(|path| sub.pattern.matches(path.as_str())) {
                continue;
            }

            match &sub.reaction {
                Reaction::Rebuild(task, kind) => {
                    match orchestrator.run(task, session) {
                        Ok(()) => live.send(*kind),
                        Err(e) => tracing::error!("rebuild failed: {e}"),
                    }
                }
                Reaction::Notify(kind) => live.send(*kind),
            }
        }
    }
}

/// Changed paths from one debounced batch. An error batch is reported and
/// yields nothing, watching continues.
fn debounced_paths(result: DebounceEventResult) -> Vec<Utf8PathBuf> {
    let events = match result {
        Ok(events) => events,
        Err(errors) => {
            for e in errors {
                tracing::error!("watch error: {e}");
            }
            return Vec::new();
        }
    };

    events
        .iter()
        .filter(|de| {
            matches!(
                de.event.kind,
                EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
            )
        })
        .flat_map(|de| &de.event.paths)
        .filter_map(|path| Utf8PathBuf::try_from(path.clone()).ok())
        .collect()
}

fn reserve_port() -> Result<(TcpListener, u16), WatchError> {
    let listener = match TcpListener::bind("127.0.0.1:1337") {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0").map_err(WatchError::Bind)?,
    };

    let addr = listener.local_addr().map_err(WatchError::Bind)?;
    let port = addr.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(
    server: TcpListener,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming().flatten() {
            if let Ok(socket) = tungstenite::accept(stream) {
                clients.lock().unwrap().push(socket);
            }
        }
    })
}

fn new_thread_ws_broadcast(clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>) -> Sender<Reload> {
    let (tx, rx) = std::sync::mpsc::channel::<Reload>();

    std::thread::spawn(move || {
        while let Ok(kind) = rx.recv() {
            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(kind.message().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(e) => {
                        tracing::error!("websocket send failed: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_messages_match_the_client_script() {
        assert_eq!(Reload::Full.message(), "reload");
        assert_eq!(Reload::Styles.message(), "refresh");

        let script = crate::serve::live_reload_script(1337);
        assert!(script.contains("\"refresh\""));
    }

    #[test]
    fn reserve_port_yields_a_bound_listener() {
        let (listener, port) = reserve_port().unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[test]
    fn error_batch_yields_no_paths() {
        assert!(debounced_paths(Err(vec![])).is_empty());
    }

    #[test]
    fn change_events_yield_their_paths() {
        use std::time::Instant;

        use notify::event::{AccessKind, ModifyKind};
        use notify_debouncer_full::DebouncedEvent;

        let modify = notify::Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path("/srv/app/sass/main.scss".into());
        let access = notify::Event::new(EventKind::Access(AccessKind::Any))
            .add_path("/srv/app/index.html".into());

        let paths = debounced_paths(Ok(vec![
            DebouncedEvent::new(modify, Instant::now()),
            DebouncedEvent::new(access, Instant::now()),
        ]));

        assert_eq!(paths, vec![Utf8PathBuf::from("/srv/app/sass/main.scss")]);
    }
}
