//! Dev HTTP server over the source tree.
//!
//! Serves the app directory on a background thread with a current-thread
//! runtime. Pages opt into live reload with a single tag:
//!
//! ```html
//! <script src="/__karakuri.js"></script>
//! ```
//!
//! The served script connects to the live reload websocket and either
//! re-fetches stylesheets in place or reloads the page, depending on the
//! message pushed by the watcher.

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use axum::Router;
use axum::http::header;
use axum::routing::get;
use camino::Utf8PathBuf;
use console::style;
use tower_http::services::ServeDir;

use crate::error::ServeError;

/// Bind the listener and start serving `dir` on a background thread.
/// Binding happens before the thread spawns so a taken port fails startup.
pub fn start(
    dir: Utf8PathBuf,
    port: u16,
    ws_port: u16,
) -> Result<JoinHandle<Result<(), ServeError>>, ServeError> {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = std::net::TcpListener::bind(address).map_err(ServeError::Bind)?;
    listener.set_nonblocking(true).map_err(ServeError::Bind)?;

    let url = style(format!("http://localhost:{port}/")).yellow();
    eprintln!("Starting a HTTP server on {url}");

    Ok(thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(listener, dir, ws_port))
    }))
}

async fn serve(
    listener: std::net::TcpListener,
    dir: Utf8PathBuf,
    ws_port: u16,
) -> Result<(), ServeError> {
    let listener = tokio::net::TcpListener::from_std(listener)?;

    let script = live_reload_script(ws_port);
    let router = Router::new()
        .route(
            "/__karakuri.js",
            get(move || {
                let script = script.clone();
                async move { ([(header::CONTENT_TYPE, "text/javascript")], script) }
            }),
        )
        // everything else comes straight from the source tree
        .fallback_service(ServeDir::new(dir));

    axum::serve(listener, router).await?;

    Ok(())
}

/// The JS snippet which enables live reloading in the browser.
pub fn live_reload_script(ws_port: u16) -> String {
    format!(
        r#"
const socket = new WebSocket("ws://localhost:{ws_port}");
socket.addEventListener("message", event => {{
    if (event.data === "refresh") {{
        for (const link of document.querySelectorAll("link[rel=stylesheet]")) {{
            const url = new URL(link.href);
            url.searchParams.set("v", Date.now().toString());
            link.href = url.toString();
        }}
    }} else {{
        window.location.reload();
    }}
}});
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_embeds_the_websocket_port() {
        let script = live_reload_script(1337);
        assert!(script.contains("ws://localhost:1337"));
        assert!(script.contains("window.location.reload()"));
    }

    #[test]
    fn taken_port_fails_startup() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let err = start(Utf8PathBuf::from("app"), port, 1337).unwrap_err();
        assert!(matches!(err, ServeError::Bind(_)));
    }
}
