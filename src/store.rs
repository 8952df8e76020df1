//! Recorded game logs
//!
//! Logs live in one directory as `game_<id>.plog` JSON files:
//!
//! ```text
//! { "info": { "game_id", "game_length", "map_w", "map_h", "game_params" },
//!   "frames": [ ... game_length + 1 frames ... ] }
//! ```
//!
//! Parsing a log is expensive, so the most recently used logs are kept in
//! memory.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::net::protocol::{FramePayload, GameId, GameInfo};

const LOG_PREFIX: &str = "game_";
const LOG_EXTENSION: &str = ".plog";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown game {0}")]
    UnknownGame(GameId),
    #[error("Frame {frame_num} out of range for game {game_id} ({frame_count} is the last frame)")]
    FrameOutOfRange {
        game_id: GameId,
        frame_num: usize,
        frame_count: usize,
    },
    #[error("Invalid log for game {game_id}: {reason}")]
    InvalidLog { game_id: GameId, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct LogHeader {
    game_id: u64,
    game_length: usize,
    map_w: u32,
    map_h: u32,
    #[serde(default)]
    game_params: serde_json::Value,
}

#[derive(Deserialize)]
struct LogFile {
    info: LogHeader,
    frames: Vec<serde_json::Value>,
}

/// A parsed game log with frames kept as serialized JSON
#[derive(Debug)]
pub struct GameLog {
    pub info: GameInfo,
    frames: Vec<FramePayload>,
}

impl GameLog {
    /// Parse the contents of a `.plog` file
    pub fn parse(game_id: GameId, bytes: &[u8]) -> Result<Self, StoreError> {
        let log: LogFile = serde_json::from_slice(bytes)?;
        let header = log.info;

        if header.game_id != game_id.0 {
            return Err(StoreError::InvalidLog {
                game_id,
                reason: format!("file holds game {}", header.game_id),
            });
        }
        // One frame per move plus the final position
        if log.frames.len() != header.game_length + 1 {
            return Err(StoreError::InvalidLog {
                game_id,
                reason: format!(
                    "{} frames for a game of length {}",
                    log.frames.len(),
                    header.game_length
                ),
            });
        }

        let frames = log
            .frames
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            info: GameInfo {
                game_id,
                frame_count: header.game_length,
                board_width: header.map_w,
                board_height: header.map_h,
                game_params: header.game_params.to_string(),
            },
            frames,
        })
    }

    pub fn frame(&self, frame_num: usize) -> Result<&FramePayload, StoreError> {
        self.frames.get(frame_num).ok_or(StoreError::FrameOutOfRange {
            game_id: self.info.game_id,
            frame_num,
            frame_count: self.info.frame_count,
        })
    }
}

/// Log cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Directory of game logs with a small LRU cache in front of it
pub struct LogStore {
    dir: PathBuf,
    capacity: usize,
    /// Most recently used at the back
    cache: Mutex<VecDeque<(GameId, Arc<GameLog>)>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
            cache: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, game_id: GameId) -> PathBuf {
        self.dir.join(format!("{}{}{}", LOG_PREFIX, game_id, LOG_EXTENSION))
    }

    /// Ids of every log in the directory, ascending
    pub fn list_games(&self) -> Result<Vec<GameId>, StoreError> {
        let mut game_ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let id = name
                .strip_prefix(LOG_PREFIX)
                .and_then(|rest| rest.strip_suffix(LOG_EXTENSION))
                .and_then(|id| id.parse::<GameId>().ok());
            if let Some(id) = id {
                game_ids.push(id);
            }
        }
        game_ids.sort_unstable();
        game_ids.dedup();
        Ok(game_ids)
    }

    /// Load a log, from the cache if possible
    pub fn load(&self, game_id: GameId) -> Result<Arc<GameLog>, StoreError> {
        {
            let mut cache = self.cache.lock();
            if let Some(pos) = cache.iter().position(|(id, _)| *id == game_id) {
                if let Some(entry) = cache.remove(pos) {
                    let log = entry.1.clone();
                    cache.push_back(entry);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(log);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Parse outside the lock; a concurrent miss on the same game just
        // parses twice
        let path = self.log_path(game_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::UnknownGame(game_id));
            }
            Err(e) => return Err(e.into()),
        };
        let log = Arc::new(GameLog::parse(game_id, &bytes)?);
        info!(
            "Loaded game {} from {} ({} frames)",
            game_id,
            path.display(),
            log.info.frame_count + 1
        );

        let mut cache = self.cache.lock();
        cache.retain(|(id, _)| *id != game_id);
        cache.push_back((game_id, log.clone()));
        while cache.len() > self.capacity {
            if let Some((evicted, _)) = cache.pop_front() {
                debug!("Dropped game {} from log cache", evicted);
            }
        }
        Ok(log)
    }

    pub fn game_info(&self, game_id: GameId) -> Result<GameInfo, StoreError> {
        Ok(self.load(game_id)?.info.clone())
    }

    pub fn frame(&self, game_id: GameId, frame_num: usize) -> Result<FramePayload, StoreError> {
        let log = self.load(game_id)?;
        log.frame(frame_num).cloned()
    }

    /// Ids currently held in memory, least recently used first
    pub fn cached_games(&self) -> Vec<GameId> {
        self.cache.lock().iter().map(|(id, _)| *id).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    /// Fresh empty directory under the system temp dir
    pub fn temp_log_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "replay-viewer-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Log with `game_length + 1` frames, frame `i` being `{"move": i}`
    pub fn log_json(game_id: u64, game_length: usize) -> String {
        let frames: Vec<String> = (0..=game_length)
            .map(|i| format!("{{\"move\":{}}}", i))
            .collect();
        format!(
            "{{\"info\":{{\"game_id\":{},\"game_length\":{},\"map_w\":20,\"map_h\":12,\"game_params\":{{\"seed\":7}}}},\"frames\":[{}]}}",
            game_id,
            game_length,
            frames.join(",")
        )
    }

    pub fn write_log(dir: &std::path::Path, game_id: u64, game_length: usize) {
        std::fs::write(
            dir.join(format!("game_{}.plog", game_id)),
            log_json(game_id, game_length),
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_parse_log() {
        let log = GameLog::parse(GameId(4), log_json(4, 3).as_bytes()).unwrap();
        assert_eq!(log.info.frame_count, 3);
        assert_eq!(log.info.board_width, 20);
        assert_eq!(log.info.board_height, 12);
        assert_eq!(log.info.params().unwrap()["seed"], 7);
        assert_eq!(log.frame(3).unwrap(), &b"{\"move\":3}".to_vec());
        assert!(matches!(
            log.frame(4),
            Err(StoreError::FrameOutOfRange { frame_num: 4, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_frame_count() {
        let json = log_json(1, 3).replace(",{\"move\":3}", "");
        let result = GameLog::parse(GameId(1), json.as_bytes());
        assert!(matches!(result, Err(StoreError::InvalidLog { .. })));
    }

    #[test]
    fn test_parse_rejects_mismatched_id() {
        let result = GameLog::parse(GameId(2), log_json(1, 3).as_bytes());
        assert!(matches!(result, Err(StoreError::InvalidLog { .. })));
    }

    #[test]
    fn test_list_games() {
        let dir = temp_log_dir("list");
        write_log(&dir, 12, 2);
        write_log(&dir, 3, 2);
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        std::fs::write(dir.join("game_abc.plog"), "x").unwrap();

        let store = LogStore::new(&dir, 3);
        assert_eq!(store.list_games().unwrap(), vec![GameId(3), GameId(12)]);
    }

    #[test]
    fn test_unknown_game() {
        let dir = temp_log_dir("unknown");
        let store = LogStore::new(&dir, 3);
        assert!(matches!(store.load(GameId(9)), Err(StoreError::UnknownGame(GameId(9)))));
    }

    #[test]
    fn test_lru_cache() {
        let dir = temp_log_dir("lru");
        for id in 1..=4 {
            write_log(&dir, id, 2);
        }
        let store = LogStore::new(&dir, 3);

        store.load(GameId(1)).unwrap();
        store.load(GameId(2)).unwrap();
        store.load(GameId(3)).unwrap();
        store.load(GameId(1)).unwrap();
        assert_eq!(store.stats(), CacheStats { hits: 1, misses: 3 });
        assert_eq!(store.cached_games(), vec![GameId(2), GameId(3), GameId(1)]);

        store.load(GameId(4)).unwrap();
        assert_eq!(store.cached_games(), vec![GameId(3), GameId(1), GameId(4)]);
    }

    #[test]
    fn test_frame_lookup() {
        let dir = temp_log_dir("frame");
        write_log(&dir, 5, 4);
        let store = LogStore::new(&dir, 3);

        assert_eq!(store.game_info(GameId(5)).unwrap().frame_count, 4);
        assert_eq!(store.frame(GameId(5), 0).unwrap(), b"{\"move\":0}".to_vec());
        assert!(store.frame(GameId(5), 5).is_err());
    }
}
