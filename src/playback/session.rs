//! Viewer session
//!
//! Wraps a [`PlaybackEngine`] with the lifecycle around it: waiting for the
//! transport, requesting the game header once, routing provider events and
//! tearing everything down when the viewed game changes.

use tracing::{debug, info, warn};

use crate::net::protocol::GameId;
use crate::net::provider::{FrameProvider, ProviderEvent};
use crate::playback::clock::{MonotonicTime, TimeSource};
use crate::playback::controls::{ControlAction, PlaybackControls};
use crate::playback::engine::{EngineConfig, PlaybackEngine, TickReport};
use crate::playback::PlaybackError;

/// What the viewer should display this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerStatus {
    /// Waiting for the transport to come up
    Connecting,
    /// Transport is down; no retry is attempted
    ConnectionFailed(String),
    LoadingGameInfo,
    /// Current frame requested but not yet received
    LoadingFrame,
    /// Current frame is resident (playing or paused)
    Ready,
    /// The game header could not be played; stays until the game changes
    GameFailed(String),
}

impl ViewerStatus {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, ViewerStatus::Ready)
    }
}

/// Transport state as last reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Connected,
    Failed(String),
}

pub struct ViewerSession<P: FrameProvider, T: TimeSource + Clone = MonotonicTime> {
    provider: P,
    time: T,
    config: EngineConfig,
    game_id: GameId,
    connection: ConnectionState,
    info_requested: bool,
    game_error: Option<String>,
    engine: Option<PlaybackEngine<T>>,
    controls: PlaybackControls,
    available_games: Vec<GameId>,
    last_report: Option<TickReport>,
}

impl<P: FrameProvider, T: TimeSource + Clone> ViewerSession<P, T> {
    /// Fails when `config` could not play any game
    pub fn new(
        provider: P,
        time: T,
        config: EngineConfig,
        game_id: GameId,
    ) -> Result<Self, PlaybackError> {
        config.validate()?;
        Ok(Self {
            provider,
            time,
            config,
            game_id,
            connection: ConnectionState::Connecting,
            info_requested: false,
            game_error: None,
            engine: None,
            controls: PlaybackControls::new(),
            available_games: Vec::new(),
            last_report: None,
        })
    }

    #[inline]
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Engine for the viewed game, once its header has arrived
    #[inline]
    pub fn engine(&self) -> Option<&PlaybackEngine<T>> {
        self.engine.as_ref()
    }

    #[inline]
    pub fn engine_mut(&mut self) -> Option<&mut PlaybackEngine<T>> {
        self.engine.as_mut()
    }

    #[inline]
    pub fn controls(&self) -> &PlaybackControls {
        &self.controls
    }

    #[inline]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[inline]
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Game ids from the most recent listing
    pub fn available_games(&self) -> &[GameId] {
        &self.available_games
    }

    /// Report from the last engine tick
    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    pub fn handle_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::Connected => {
                info!("Connected to replay server");
                self.connection = ConnectionState::Connected;
            }
            ProviderEvent::Disconnected { reason } => {
                warn!("Replay server connection lost: {}", reason);
                self.connection = ConnectionState::Failed(reason);
                // Ask again if the transport comes back before the header did
                self.info_requested = false;
            }
            ProviderEvent::GameInfo(game_info) => {
                if game_info.game_id != self.game_id {
                    debug!("Ignoring info for game {}", game_info.game_id);
                    return;
                }
                if self.engine.is_some() {
                    debug!("Ignoring repeated info for game {}", game_info.game_id);
                    return;
                }
                let frame_count = game_info.frame_count;
                match PlaybackEngine::new(game_info, self.config, self.time.clone()) {
                    Ok(engine) => {
                        info!("Loaded game {} ({} frames)", self.game_id, frame_count);
                        self.engine = Some(engine);
                    }
                    Err(e) => {
                        warn!("Cannot play game {}: {}", self.game_id, e);
                        self.game_error = Some(e.to_string());
                    }
                }
            }
            ProviderEvent::Frame {
                game_id,
                frame_num,
                payload,
            } => match self.engine.as_mut() {
                Some(engine) => {
                    engine.on_frame_arrived(game_id, frame_num, payload);
                }
                None => debug!("Ignoring frame {} of game {}: no active game", frame_num, game_id),
            },
            ProviderEvent::Games(game_ids) => {
                let listed: Vec<u64> = game_ids.iter().map(|id| id.0).collect();
                info!("Server has {} recorded games: {:?}", listed.len(), listed);
                self.available_games = game_ids;
            }
            ProviderEvent::ServerError {
                game_id,
                frame_num,
                reason,
            } => {
                warn!(
                    "Server error (game {:?}, frame {:?}): {}",
                    game_id.map(|id| id.0),
                    frame_num,
                    reason
                );
            }
        }
    }

    /// Apply the events received since the last tick, then advance playback
    pub fn tick(&mut self, events: impl IntoIterator<Item = ProviderEvent>) -> ViewerStatus {
        for event in events {
            self.handle_event(event);
        }

        match &self.connection {
            ConnectionState::Connecting => return ViewerStatus::Connecting,
            ConnectionState::Failed(reason) => {
                return ViewerStatus::ConnectionFailed(reason.clone());
            }
            ConnectionState::Connected => {}
        }
        if let Some(reason) = &self.game_error {
            return ViewerStatus::GameFailed(reason.clone());
        }

        let Some(engine) = self.engine.as_mut() else {
            if !self.info_requested {
                debug!("Requesting info for game {}", self.game_id);
                self.provider.request_game_info(self.game_id);
                self.info_requested = true;
            }
            return ViewerStatus::LoadingGameInfo;
        };

        let report = engine.tick(&mut self.provider);
        self.last_report = Some(report);
        if engine.current_frame().is_some() {
            ViewerStatus::Ready
        } else {
            ViewerStatus::LoadingFrame
        }
    }

    /// Run a user command against the active game. Ignored while loading.
    pub fn apply(&mut self, action: ControlAction) -> Result<(), PlaybackError> {
        match self.engine.as_mut() {
            Some(engine) => self.controls.apply(action, engine),
            None => {
                debug!("Ignoring {:?}: no active game", action);
                Ok(())
            }
        }
    }

    /// Seek bar input, `fraction` of the whole replay
    pub fn seek_fraction(&mut self, fraction: f64) {
        if let Some(engine) = self.engine.as_mut() {
            self.controls.seek_fraction(engine, fraction);
        }
    }

    /// Switch to another game. All state of the current game is dropped;
    /// late responses for it are ignored.
    pub fn change_game(&mut self, game_id: GameId) {
        self.teardown();
        self.game_id = game_id;
    }

    /// End the session, handing back the provider
    pub fn end_session(mut self) -> P {
        self.teardown();
        self.provider
    }

    fn teardown(&mut self) {
        if let Some(engine) = self.engine.take() {
            info!(
                "Closing game {} ({} frames cached, {} requests outstanding)",
                engine.game_id(),
                engine.cache().resident_len(),
                engine.cache().pending_len()
            );
        }
        self.info_requested = false;
        self.game_error = None;
        self.controls = PlaybackControls::new();
        self.last_report = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::GameInfo;
    use crate::net::provider::RecordingProvider;
    use crate::playback::clock::ManualTime;

    fn game_info(game_id: u64, frame_count: usize) -> ProviderEvent {
        ProviderEvent::GameInfo(GameInfo {
            game_id: GameId(game_id),
            frame_count,
            board_width: 8,
            board_height: 8,
            game_params: "{}".to_string(),
        })
    }

    fn frame(game_id: u64, frame_num: usize) -> ProviderEvent {
        ProviderEvent::Frame {
            game_id: GameId(game_id),
            frame_num,
            payload: vec![frame_num as u8],
        }
    }

    fn session(game_id: u64) -> (ManualTime, ViewerSession<RecordingProvider, ManualTime>) {
        let time = ManualTime::new();
        let session = ViewerSession::new(
            RecordingProvider::default(),
            time.clone(),
            EngineConfig::default(),
            GameId(game_id),
        )
        .unwrap();
        (time, session)
    }

    #[test]
    fn test_connecting_until_transport_up() {
        let (_, mut session) = session(1);
        assert_eq!(session.tick([]), ViewerStatus::Connecting);
        assert!(session.provider().info_requests.is_empty());
    }

    #[test]
    fn test_connection_failure_is_persistent() {
        let (_, mut session) = session(1);
        let status = session.tick([ProviderEvent::Disconnected {
            reason: "refused".to_string(),
        }]);
        assert_eq!(status, ViewerStatus::ConnectionFailed("refused".to_string()));
        assert_eq!(
            session.tick([]),
            ViewerStatus::ConnectionFailed("refused".to_string())
        );
        assert!(session.provider().info_requests.is_empty());
    }

    #[test]
    fn test_unplayable_config_rejected() {
        let config = EngineConfig {
            frame_period_ms: 0.0,
            ..EngineConfig::default()
        };
        let result = ViewerSession::new(RecordingProvider::default(), ManualTime::new(), config, GameId(1));
        assert!(matches!(result, Err(PlaybackError::InvalidFramePeriod(_))));

        let config = EngineConfig {
            frame_period_ms: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unplayable_game_info_is_reported() {
        let (_, mut session) = session(1);
        // Bypass construction checks so engine creation fails on arrival
        session.config.frame_period_ms = 0.0;

        session.tick([ProviderEvent::Connected]);
        let status = session.tick([game_info(1, 10)]);
        assert!(matches!(status, ViewerStatus::GameFailed(_)));
        assert!(matches!(session.tick([game_info(1, 10)]), ViewerStatus::GameFailed(_)));
        assert!(session.engine().is_none());
        assert_eq!(session.provider().info_requests, vec![GameId(1)]);

        session.config.frame_period_ms = 1000.0;
        session.change_game(GameId(2));
        assert_eq!(session.tick([]), ViewerStatus::LoadingGameInfo);
        assert_eq!(session.tick([game_info(2, 10)]), ViewerStatus::LoadingFrame);
    }

    #[test]
    fn test_game_info_requested_once() {
        let (_, mut session) = session(1);
        assert_eq!(session.tick([ProviderEvent::Connected]), ViewerStatus::LoadingGameInfo);
        assert_eq!(session.tick([]), ViewerStatus::LoadingGameInfo);
        assert_eq!(session.tick([]), ViewerStatus::LoadingGameInfo);
        assert_eq!(session.provider().info_requests, vec![GameId(1)]);
    }

    #[test]
    fn test_loads_then_ready() {
        let (_, mut session) = session(1);
        session.tick([ProviderEvent::Connected]);

        assert_eq!(session.tick([game_info(1, 10)]), ViewerStatus::LoadingFrame);
        assert_eq!(
            session.provider_mut().take_frame_requests(),
            vec![(GameId(1), 0)]
        );

        assert_eq!(session.tick([frame(1, 0)]), ViewerStatus::Ready);
        let engine = session.engine().unwrap();
        assert_eq!(engine.current_frame(), Some(&vec![0u8]));
    }

    #[test]
    fn test_info_for_other_game_ignored() {
        let (_, mut session) = session(1);
        session.tick([ProviderEvent::Connected]);
        assert_eq!(session.tick([game_info(2, 10)]), ViewerStatus::LoadingGameInfo);
        assert!(session.engine().is_none());
    }

    #[test]
    fn test_frames_before_info_ignored() {
        let (_, mut session) = session(1);
        session.tick([ProviderEvent::Connected, frame(1, 0)]);
        session.tick([game_info(1, 10)]);
        let engine = session.engine().unwrap();
        assert!(engine.cache().is_pending(0));
        assert_eq!(engine.cache().resident_len(), 0);
    }

    #[test]
    fn test_change_game_discards_stale_responses() {
        let (_, mut session) = session(1);
        session.tick([ProviderEvent::Connected]);
        session.tick([game_info(1, 10)]);
        session.provider_mut().take_frame_requests();

        session.change_game(GameId(2));
        assert!(session.engine().is_none());
        assert_eq!(session.tick([]), ViewerStatus::LoadingGameInfo);
        assert_eq!(session.provider().info_requests, vec![GameId(1), GameId(2)]);

        // Late traffic for game 1
        session.tick([game_info(1, 10), frame(1, 0)]);
        assert!(session.engine().is_none());

        session.tick([game_info(2, 4)]);
        session.tick([frame(1, 0)]);
        let engine = session.engine().unwrap();
        assert_eq!(engine.game_id(), GameId(2));
        assert_eq!(engine.cache().resident_len(), 0);
        assert!(engine.cache().is_pending(0));
    }

    #[test]
    fn test_server_error_leaves_frame_pending() {
        let (_, mut session) = session(1);
        session.tick([ProviderEvent::Connected, game_info(1, 10)]);
        session.tick([ProviderEvent::ServerError {
            game_id: Some(GameId(1)),
            frame_num: Some(0),
            reason: "frame out of range".to_string(),
        }]);
        assert!(session.engine().unwrap().cache().is_pending(0));
    }

    #[test]
    fn test_controls_drive_engine() {
        let (time, mut session) = session(1);
        session.tick([ProviderEvent::Connected, game_info(1, 100)]);

        session.apply(ControlAction::TogglePlay).unwrap();
        session.tick([]);
        time.advance(2500.0);
        session.tick([]);
        assert_eq!(session.engine().unwrap().position().frame_index, 2);

        session.apply(ControlAction::Faster).unwrap();
        assert_eq!(session.engine().unwrap().clock().rate(), 1.5);

        session.seek_fraction(0.5);
        session.tick([]);
        assert_eq!(session.engine().unwrap().position().frame_index, 50);
    }

    #[test]
    fn test_controls_before_load_are_ignored() {
        let (_, mut session) = session(1);
        assert!(session.apply(ControlAction::TogglePlay).is_ok());
        assert_eq!(session.controls().rate_index(), 3);
    }

    #[test]
    fn test_game_listing_recorded() {
        let (_, mut session) = session(1);
        session.tick([ProviderEvent::Games(vec![GameId(1), GameId(4)])]);
        assert_eq!(session.available_games(), &[GameId(1), GameId(4)]);
    }

    #[test]
    fn test_end_session_returns_provider() {
        let (_, mut session) = session(3);
        session.tick([ProviderEvent::Connected]);
        let provider = session.end_session();
        assert_eq!(provider.info_requests, vec![GameId(3)]);
    }
}
