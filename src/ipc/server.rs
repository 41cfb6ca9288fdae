//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;
use crate::session::{SessionClosed, SessionHandle};

use super::protocol::{DaemonStatus, Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: ClientContext,
    shutdown_tx: broadcast::Sender<()>,
}

/// What each client handler needs
#[derive(Clone)]
struct ClientContext {
    session: SessionHandle,
    event_tx: broadcast::Sender<SessionEvent>,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(
        socket_path: &Path,
        session: SessionHandle,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: ClientContext {
                session,
                event_tx,
                start_time: Instant::now(),
            },
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Frames are read on a separate task so that a half-read request is
    /// never lost while a notification is being written.
    async fn handle_client(stream: UnixStream, context: ClientContext) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel(16);
        let reader_task = tokio::spawn(read_requests(reader, request_tx));
        let mut events: Option<broadcast::Receiver<SessionEvent>> = None;

        let result = loop {
            tokio::select! {
                incoming = request_rx.recv() => {
                    let response = match incoming {
                        Some(Ok(request)) => {
                            debug!(?request, "received request");
                            let (response, subscribe) = Self::process_request(request, &context).await;
                            if subscribe && events.is_none() {
                                events = Some(context.event_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Some(Err(message)) => Response::Error {
                            code: "invalid_request".to_string(),
                            message,
                        },
                        None => break Ok(()),
                    };
                    if let Err(e) = Self::send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    let notification = match event {
                        Ok(event) => Notification::Event { event },
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "client lagged behind session events");
                            Notification::Lagged { skipped }
                        }
                        Err(RecvError::Closed) => {
                            events = None;
                            continue;
                        }
                    };
                    if let Err(e) = Self::send_message(&mut writer, &notification).await {
                        break Err(e);
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, context: &ClientContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let response = match context.session.snapshot().await {
                    Ok(session) => Response::Status(DaemonStatus::new(
                        session,
                        context.start_time.elapsed().as_secs(),
                    )),
                    Err(e) => session_closed(e),
                };
                (response, false)
            }

            Request::Subscribe => (Response::Subscribed, true),

            Request::GetPhrases => {
                let response = match context.session.phrases().await {
                    Ok(Ok(phrases)) => Response::Phrases { phrases },
                    Ok(Err(e)) => Response::Error {
                        code: e.kind().as_str().to_string(),
                        message: e.to_string(),
                    },
                    Err(e) => session_closed(e),
                };
                (response, false)
            }

            other => {
                let response = match other.into_input() {
                    Some(input) => match context.session.send(input).await {
                        Ok(()) => Response::Accepted,
                        Err(e) => session_closed(e),
                    },
                    None => Response::Error {
                        code: "unsupported".to_string(),
                        message: "request is not a session input".to_string(),
                    },
                };
                (response, false)
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn session_closed(e: SessionClosed) -> Response {
    Response::Error {
        code: "session_closed".to_string(),
        message: e.to_string(),
    }
}

/// Wait for the next event, or forever when not subscribed
async fn next_event(
    events: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read length-prefixed requests until the client disconnects
async fn read_requests(
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<Result<Request, String>>,
) -> Result<()> {
    let mut len_buf = [0u8; 4];

    loop {
        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(());
        }

        // Read message body
        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;

        let request = serde_json::from_slice::<Request>(&msg_buf)
            .map_err(|e| format!("failed to parse request: {e}"));
        if tx.send(request).await.is_err() {
            return Ok(());
        }
    }
}
