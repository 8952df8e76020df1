//! Boundary between the playback engine and the frame transport
//!
//! Requests go out through [`FrameProvider`] without waiting for a reply.
//! Replies come back as [`ProviderEvent`]s through a [`ProviderInbox`],
//! which the viewer drains at the start of each tick.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::net::protocol::{FramePayload, GameId, GameInfo, ServerMessage};

/// Outbound half of a remote frame source
pub trait FrameProvider {
    /// Ask for a game's header; answered by [`ProviderEvent::GameInfo`]
    fn request_game_info(&mut self, game_id: GameId);

    /// Ask for one frame; answered by [`ProviderEvent::Frame`]
    fn request_frame(&mut self, game_id: GameId, frame_num: usize);
}

impl<F: FrameProvider + ?Sized> FrameProvider for Box<F> {
    fn request_game_info(&mut self, game_id: GameId) {
        (**self).request_game_info(game_id)
    }

    fn request_frame(&mut self, game_id: GameId, frame_num: usize) {
        (**self).request_frame(game_id, frame_num)
    }
}

/// Inbound notifications from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Transport is up; requests will be delivered
    Connected,
    /// Transport is down or could not be established
    Disconnected { reason: String },
    GameInfo(GameInfo),
    Frame {
        game_id: GameId,
        frame_num: usize,
        payload: FramePayload,
    },
    Games(Vec<GameId>),
    /// Server could not serve a request
    ServerError {
        game_id: Option<GameId>,
        frame_num: Option<usize>,
        reason: String,
    },
}

impl From<ServerMessage> for ProviderEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::Games { game_ids } => ProviderEvent::Games(game_ids),
            ServerMessage::GameInfo(info) => ProviderEvent::GameInfo(info),
            ServerMessage::Frame {
                game_id,
                frame_num,
                frame,
            } => ProviderEvent::Frame {
                game_id,
                frame_num,
                payload: frame,
            },
            ServerMessage::Error {
                game_id,
                frame_num,
                reason,
            } => ProviderEvent::ServerError {
                game_id,
                frame_num,
                reason,
            },
        }
    }
}

/// Event queue from transport tasks to the tick loop
///
/// Unbounded: dropping a frame response would leave its index pending
/// for the rest of the session.
pub struct ProviderInbox {
    sender: Sender<ProviderEvent>,
    receiver: Receiver<ProviderEvent>,
}

impl ProviderInbox {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Create a sender handle for a transport task
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Take every event received so far, in arrival order
    pub fn drain(&self) -> Vec<ProviderEvent> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for ProviderInbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Clonable sender handle for transport tasks
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<ProviderEvent>,
}

impl EventSender {
    /// Returns false once the inbox has been dropped
    pub fn send(&self, event: ProviderEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Provider that records requests instead of sending them
///
/// Used to drive a viewer session in-process (tests, benchmarks).
#[derive(Debug, Default)]
pub struct RecordingProvider {
    pub info_requests: Vec<GameId>,
    pub frame_requests: Vec<(GameId, usize)>,
}

impl RecordingProvider {
    /// Remove and return the frame requests recorded so far
    pub fn take_frame_requests(&mut self) -> Vec<(GameId, usize)> {
        std::mem::take(&mut self.frame_requests)
    }
}

impl FrameProvider for RecordingProvider {
    fn request_game_info(&mut self, game_id: GameId) {
        self.info_requests.push(game_id);
    }

    fn request_frame(&mut self, game_id: GameId, frame_num: usize) {
        self.frame_requests.push((game_id, frame_num));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_event(frame_num: usize) -> ProviderEvent {
        ProviderEvent::Frame {
            game_id: GameId(1),
            frame_num,
            payload: vec![frame_num as u8],
        }
    }

    #[test]
    fn test_inbox_drain_preserves_order() {
        let inbox = ProviderInbox::new();
        let sender = inbox.sender();

        assert!(sender.send(ProviderEvent::Connected));
        assert!(sender.send(frame_event(1)));
        assert!(sender.send(frame_event(2)));
        assert_eq!(inbox.pending_count(), 3);

        let events = inbox.drain();
        assert_eq!(events, vec![ProviderEvent::Connected, frame_event(1), frame_event(2)]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_sender_clone_from_threads() {
        let inbox = ProviderInbox::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let sender = inbox.sender();
                std::thread::spawn(move || sender.send(frame_event(i)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(inbox.drain().len(), 4);
    }

    #[test]
    fn test_send_after_inbox_dropped() {
        let inbox = ProviderInbox::new();
        let sender = inbox.sender();
        drop(inbox);
        assert!(!sender.send(ProviderEvent::Connected));
    }

    #[test]
    fn test_server_message_conversion() {
        let event: ProviderEvent = ServerMessage::Frame {
            game_id: GameId(1),
            frame_num: 4,
            frame: vec![4],
        }
        .into();
        assert_eq!(event, frame_event(4));

        let event: ProviderEvent = ServerMessage::Error {
            game_id: Some(GameId(1)),
            frame_num: None,
            reason: "unknown game".to_string(),
        }
        .into();
        assert!(matches!(event, ProviderEvent::ServerError { .. }));
    }

    #[test]
    fn test_recording_provider() {
        let mut provider = RecordingProvider::default();
        provider.request_game_info(GameId(2));
        provider.request_frame(GameId(2), 0);
        assert_eq!(provider.info_requests, vec![GameId(2)]);
        assert_eq!(provider.take_frame_requests(), vec![(GameId(2), 0)]);
        assert!(provider.frame_requests.is_empty());
    }
}
