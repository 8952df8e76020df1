//! TCP transport for the viewer
//!
//! [`RemoteProvider`] queues requests onto a writer task and a reader task
//! forwards every server message to the viewer's [`ProviderInbox`] as a
//! [`ProviderEvent`]. Nothing blocks the render tick.
//!
//! [`ProviderInbox`]: crate::net::provider::ProviderInbox

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::net::framing::{recv, send, FramingError};
use crate::net::protocol::{ClientMessage, GameId, ServerMessage};
use crate::net::provider::{EventSender, FrameProvider, ProviderEvent};

/// Frame provider backed by a replay server connection
pub struct RemoteProvider {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl RemoteProvider {
    /// Start connecting to `address` on `runtime`.
    ///
    /// Returns immediately; [`ProviderEvent::Connected`] or
    /// [`ProviderEvent::Disconnected`] reports the outcome. Requests made
    /// before the connection is up are sent once it is.
    pub fn connect(runtime: &Handle, address: String, events: EventSender) -> Self {
        let (outgoing, requests) = mpsc::unbounded_channel();

        runtime.spawn(async move {
            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Cannot disable Nagle on {}: {}", address, e);
                    }
                    info!("Connected to replay server at {}", address);
                    let (reader, writer) = stream.into_split();
                    run_connection(reader, writer, requests, events).await;
                }
                Err(e) => {
                    warn!("Cannot connect to replay server at {}: {}", address, e);
                    events.send(ProviderEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }
        });

        Self { outgoing }
    }

    /// Ask the server for its recorded games; answered by
    /// [`ProviderEvent::Games`]
    pub fn list_games(&mut self) {
        self.queue(ClientMessage::ListGames);
    }

    fn queue(&mut self, message: ClientMessage) {
        if self.outgoing.send(message).is_err() {
            debug!("Dropping request: connection task has ended");
        }
    }
}

impl FrameProvider for RemoteProvider {
    fn request_game_info(&mut self, game_id: GameId) {
        self.queue(ClientMessage::GetGameInfo { game_id });
    }

    fn request_frame(&mut self, game_id: GameId, frame_num: usize) {
        self.queue(ClientMessage::GetFrame { game_id, frame_num });
    }
}

/// Pump requests out and responses in until either side fails
///
/// Reports [`ProviderEvent::Disconnected`] for whichever direction fails
/// first. Ends quietly once the viewer has dropped its provider or inbox.
pub async fn run_connection<R, W>(
    mut reader: R,
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<ClientMessage>,
    events: EventSender,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    events.send(ProviderEvent::Connected);

    let write_requests = async move {
        while let Some(request) = requests.recv().await {
            send(&mut writer, &request).await?;
        }
        Ok::<(), FramingError>(())
    };

    let reason = tokio::select! {
        reason = forward_responses(&mut reader, &events) => reason,
        result = write_requests => match result {
            // Provider dropped
            Ok(()) => None,
            Err(e) => Some(format!("cannot send request: {}", e)),
        },
    };

    if let Some(reason) = reason {
        warn!("Replay server connection lost: {}", reason);
        events.send(ProviderEvent::Disconnected { reason });
    }
}

/// Forward server messages to the inbox. Returns the failure reason, or
/// None when the inbox is gone.
async fn forward_responses<R: AsyncRead + Unpin>(reader: &mut R, events: &EventSender) -> Option<String> {
    loop {
        match recv::<ServerMessage, _>(reader).await {
            Ok(message) => {
                if !events.send(message.into()) {
                    return None;
                }
            }
            Err(FramingError::ConnectionClosed) => {
                return Some("server closed the connection".to_string());
            }
            Err(FramingError::Decode(e)) => {
                // Framing is intact; skip the message
                warn!("Undecodable message from server: {}", e);
            }
            Err(e) => return Some(e.to_string()),
        }
    }
}
