//! Loopback HTTP transport for command-line logins.
//!
//! Binds a TCP listener on `127.0.0.1:<port>`, opens the system browser at the
//! provider URL and serves the completion page the provider redirects back
//! to. The page turns its URL fragment (which never reaches a server) into a
//! `/relay?...` request; the relayed parameters are forwarded to the waiting
//! caller as a [`ChannelMessage`] from `http://127.0.0.1:<port>`.
//!
//! The redirect URI `http://127.0.0.1:<port>/silent-refresh` must be
//! registered on the app client.

use crate::{completion::relay_message, fragment::FragmentParams};
use async_trait::async_trait;
use linglear_types::{
    ChannelHandle, ChannelMessage, HiddenContext, LinglearError, Result, SilentTransport,
};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};

/// Path of the completion page.
pub const COMPLETION_PATH: &str = "/silent-refresh";

/// Path the completion page relays its fragment to.
pub const RELAY_PATH: &str = "/relay";

const COMPLETION_HTML: &str = "<!doctype html><html><head><title>Linglear</title></head>\
<body><p>Completing sign-in&hellip;</p>\
<script>location.replace('/relay?' + location.hash.slice(1));</script>\
</body></html>";

const DONE_HTML: &str = "<!doctype html><html><body><h1>Login complete</h1>\
<p>You may close this tab.</p></body></html>";

const MISSING_HTML: &str = "<!doctype html><html><body><h1>No login result</h1>\
<p>The identity provider returned nothing. Please try again.</p></body></html>";

/// Consecutive `accept` failures after which the listener gives up.
const MAX_ACCEPT_FAILURES: u32 = 10;

/// `http://127.0.0.1:<port>`, the origin relayed messages carry.
#[must_use]
pub fn loopback_origin(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// The redirect URI served by a loopback transport on `port`.
#[must_use]
pub fn redirect_uri(port: u16) -> String {
    format!("{}{COMPLETION_PATH}", loopback_origin(port))
}

/// Opens provider URLs in the system browser and listens on loopback.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    port: u16,
    open_browser: bool,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            open_browser: true,
        }
    }

    /// Print the URL instead of launching a browser.
    #[must_use]
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Bind the loopback port.
///
/// Bind **before** sending the browser to the provider, otherwise a fast
/// redirect can arrive before anyone listens.
///
/// # Errors
///
/// Returns an error if the port is already in use or cannot be bound.
pub async fn bind(port: u16) -> Result<TcpListener> {
    TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            LinglearError::Auth(format!(
                "port {port} is already in use; stop the other login or set loopback.port"
            ))
        } else {
            LinglearError::Auth(format!("cannot bind loopback port {port}: {e}"))
        }
    })
}

struct LoopbackContext {
    server: Option<JoinHandle<()>>,
}

impl HiddenContext for LoopbackContext {
    fn close(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
            tracing::debug!("loopback listener closed");
        }
    }
}

#[async_trait]
impl SilentTransport for LoopbackTransport {
    async fn open(&self, url: &str) -> Result<ChannelHandle> {
        let listener = bind(self.port).await?;
        let port = listener
            .local_addr()
            .map_err(|e| LinglearError::Auth(e.to_string()))?
            .port();
        let origin = loopback_origin(port);
        let (tx, rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(serve(listener, origin, tx));

        if self.open_browser {
            if let Err(e) = open::that(url) {
                tracing::warn!(error = %e, "could not open browser");
                eprintln!("Open this URL in your browser:\n{url}");
            }
        } else {
            eprintln!("Open this URL in your browser:\n{url}");
        }

        Ok(ChannelHandle::new(
            rx,
            Box::new(LoopbackContext {
                server: Some(server),
            }),
        ))
    }
}

/// Serve the completion page and relay results until the receiver goes away.
pub async fn serve(
    listener: TcpListener,
    origin: String,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) {
    let mut failures = 0;
    loop {
        let mut stream = match listener.accept().await {
            Ok((stream, _)) => {
                failures = 0;
                stream
            }
            Err(e) => {
                failures += 1;
                let Some(pause) = accept_backoff(failures) else {
                    tracing::error!(error = %e, failures, "loopback accept failing, giving up");
                    break;
                };
                tracing::warn!(error = %e, "loopback accept failed");
                tokio::time::sleep(pause).await;
                continue;
            }
        };
        let relayed = match handle_connection(&mut stream).await {
            Ok(relayed) => relayed,
            Err(e) => {
                tracing::debug!(error = %e, "loopback request failed");
                None
            }
        };
        let _ = stream.shutdown().await;
        if let Some(params) = relayed {
            let message = ChannelMessage::new(origin.clone(), relay_message(&params).to_value());
            if tx.send(message).is_err() {
                break;
            }
        }
    }
}

/// Pause before retrying after `failures` consecutive accept errors, or
/// `None` once the listener should stop.
fn accept_backoff(failures: u32) -> Option<Duration> {
    (failures < MAX_ACCEPT_FAILURES).then(|| Duration::from_millis(50 << failures.min(4)))
}

async fn handle_connection(stream: &mut TcpStream) -> std::io::Result<Option<FragmentParams>> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let (path, query) = request_target(&request);

    let (status, body, relayed) = match path {
        COMPLETION_PATH => ("200 OK", COMPLETION_HTML, None),
        RELAY_PATH => match FragmentParams::parse(query).filter(FragmentParams::is_relevant) {
            Some(params) => ("200 OK", DONE_HTML, Some(params)),
            None => ("400 Bad Request", MISSING_HTML, None),
        },
        _ => ("404 Not Found", "", None),
    };
    stream.write_all(response(status, body).as_bytes()).await?;
    Ok(relayed)
}

fn response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Path and query of the request line, e.g. `GET /relay?a=b HTTP/1.1`.
fn request_target(request: &str) -> (&str, &str) {
    let first_line = request.lines().next().unwrap_or("");
    let target = first_line.split_ascii_whitespace().nth(1).unwrap_or("/");
    target.split_once('?').unwrap_or((target, ""))
}
