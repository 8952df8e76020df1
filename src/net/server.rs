//! TCP replay server
//!
//! Each connection is served in its own task, one request at a time, so
//! responses go out in request order.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::metrics::Metrics;
#[cfg(feature = "dos_ratelimit")]
use crate::net::limits::LimitError;
use crate::net::limits::{ConnectionGuard, ViewerId, ViewerLimits};
use crate::net::framing::{read_message, send, FramingError};
use crate::net::protocol::{decode, ClientMessage, ServerMessage};
use crate::store::{LogStore, StoreError};

struct ServerState {
    store: Arc<LogStore>,
    metrics: Arc<Metrics>,
    guard: Mutex<ConnectionGuard>,
}

pub struct ReplayServer {
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl ReplayServer {
    pub fn new(config: ServerConfig, store: Arc<LogStore>, metrics: Arc<Metrics>) -> Self {
        let limits = ViewerLimits {
            max_viewers_per_ip: config.max_connections_per_ip,
            max_requests_per_window: config.max_messages_per_second,
            ..ViewerLimits::default()
        };
        Self {
            config,
            state: Arc::new(ServerState {
                store,
                metrics,
                guard: Mutex::new(ConnectionGuard::new(limits)),
            }),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Bind the configured address and serve until the task is cancelled
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!(
            "Replay server listening on {} (logs in {})",
            listener.local_addr()?,
            self.state.store.dir().display()
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            let state = self.state.clone();

            let connection_id = match state.guard.lock().admit(peer.ip()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Connection from {} rejected: {}", peer, e);
                    state.metrics.connections_rejected.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            tokio::spawn(async move {
                state.metrics.connections_active.fetch_add(1, Ordering::Relaxed);
                state.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
                debug!("Viewer connected from {} (conn_id: {})", peer, connection_id);

                match handle_connection(stream, peer, connection_id, state.clone()).await {
                    Ok(()) | Err(FramingError::ConnectionClosed) => {
                        debug!("Viewer {} disconnected", peer);
                    }
                    Err(e) => warn!("Connection error from {}: {}", peer, e),
                }

                state.guard.lock().release(connection_id, peer.ip());
                state.metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    connection_id: ViewerId,
    state: Arc<ServerState>,
) -> Result<(), FramingError> {
    let _ = stream.set_nodelay(true);

    loop {
        let bytes = read_message(&mut stream).await?;
        let started = Instant::now();
        state.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        state.metrics.bytes_received.fetch_add(bytes.len() as u64 + 4, Ordering::Relaxed);

        #[cfg(feature = "dos_ratelimit")]
        {
            let check = state.guard.lock().check_request(connection_id, bytes.len());
            if let Err(e) = check {
                state.metrics.messages_dropped.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    warn!("Closing connection {} from {}: {}", connection_id, peer, e);
                    return Ok(());
                }
                if e == LimitError::RateExceeded {
                    debug!("Rate limited connection {}", connection_id);
                }
                continue;
            }
        }

        let request: ClientMessage = match decode(&bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed message from {} (conn_id: {}): {}", peer, connection_id, e);
                state.metrics.messages_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        // Log parsing reads from disk
        let worker_state = state.clone();
        let response = tokio::task::spawn_blocking(move || {
            respond(&worker_state.store, &worker_state.metrics, request)
        })
        .await
        .map_err(|e| FramingError::Io(std::io::Error::other(e)))?;

        let written = send(&mut stream, &response).await?;
        state.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
        state.metrics.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
        state.metrics.record_request_time(started.elapsed());
    }
}

/// Answer one request from the log store
pub fn respond(store: &LogStore, metrics: &Metrics, request: ClientMessage) -> ServerMessage {
    let response = match request {
        ClientMessage::ListGames => store.list_games().map(|game_ids| {
            metrics.game_lists_served.fetch_add(1, Ordering::Relaxed);
            ServerMessage::Games { game_ids }
        }),
        ClientMessage::GetGameInfo { game_id } => store.game_info(game_id).map(|info| {
            metrics.game_infos_served.fetch_add(1, Ordering::Relaxed);
            ServerMessage::GameInfo(info)
        }),
        ClientMessage::GetFrame { game_id, frame_num } => {
            store.frame(game_id, frame_num).map(|frame| {
                metrics.frames_served.fetch_add(1, Ordering::Relaxed);
                ServerMessage::Frame {
                    game_id,
                    frame_num,
                    frame,
                }
            })
        }
    };
    metrics.sync_cache_stats(store.stats());

    response.unwrap_or_else(|e| {
        metrics.request_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Request failed: {}", e);
        error_response(e)
    })
}

fn error_response(error: StoreError) -> ServerMessage {
    let (game_id, frame_num) = match &error {
        StoreError::UnknownGame(game_id) => (Some(*game_id), None),
        StoreError::FrameOutOfRange {
            game_id, frame_num, ..
        } => (Some(*game_id), Some(*frame_num)),
        StoreError::InvalidLog { game_id, .. } => (Some(*game_id), None),
        StoreError::Io(_) | StoreError::Json(_) => (None, None),
    };
    ServerMessage::Error {
        game_id,
        frame_num,
        reason: error.to_string(),
    }
}
