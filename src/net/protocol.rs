use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw recorded frame, opaque to the playback engine
pub type FramePayload = Vec<u8>;

/// Identifier of a recorded game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GameId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(GameId)
    }
}

/// Messages from viewer to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// List the recorded games available on the server
    ListGames,
    /// Request the header of a recorded game
    GetGameInfo { game_id: GameId },
    /// Request one frame of a recorded game
    GetFrame { game_id: GameId, frame_num: usize },
}

/// Messages from server to viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Available game ids, ascending
    Games { game_ids: Vec<GameId> },
    /// Header of a recorded game
    GameInfo(GameInfo),
    /// One recorded frame
    Frame {
        game_id: GameId,
        frame_num: usize,
        frame: FramePayload,
    },
    /// A request could not be served
    Error {
        game_id: Option<GameId>,
        frame_num: Option<usize>,
        reason: String,
    },
}

/// Recorded game header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: GameId,
    /// Index of the final frame; the game has `frame_count + 1` frames
    pub frame_count: usize,
    pub board_width: u32,
    pub board_height: u32,
    /// Game parameters as recorded, JSON text
    pub game_params: String,
}

impl GameInfo {
    /// Parsed game parameters
    pub fn params(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.game_params)
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
