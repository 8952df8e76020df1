use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{net, timing, window};
use crate::net::protocol::GameId;
use crate::playback::{EngineConfig, RetentionWindow};

/// Read `name` from the environment into `target`, keeping the current
/// value when the variable is unset, unparsable or rejected by `valid`
fn env_override<T: FromStr>(name: &str, target: &mut T, valid: impl Fn(&T) -> bool, rule: &str) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) if valid(&parsed) => *target = parsed,
        Ok(_) => tracing::warn!("{} must be {}, using default", name, rule),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Replay server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory holding `game_<id>.plog` files
    pub game_logs: PathBuf,
    /// Number of parsed game logs kept in memory
    pub log_cache_size: usize,
    /// Port of the metrics HTTP endpoint
    pub metrics_port: u16,
    /// Maximum concurrent viewer connections from one IP
    pub max_connections_per_ip: usize,
    /// Maximum requests per second on one connection
    pub max_messages_per_second: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: net::DEFAULT_PORT,
            game_logs: PathBuf::from("game_logs"),
            log_cache_size: 3,
            metrics_port: net::DEFAULT_METRICS_PORT,
            max_connections_per_ip: 8,
            max_messages_per_second: 400,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        env_override("PORT", &mut config.port, |p| *p > 0, "> 0");

        if let Ok(dir) = std::env::var("GAME_LOGS") {
            if dir.trim().is_empty() {
                tracing::warn!("GAME_LOGS is empty, using default");
            } else {
                config.game_logs = PathBuf::from(dir);
            }
        }

        env_override("LOG_CACHE_SIZE", &mut config.log_cache_size, |n| (1..=64).contains(n), "1-64");
        env_override("METRICS_PORT", &mut config.metrics_port, |p| *p > 0, "> 0");
        env_override("MAX_CONNECTIONS_PER_IP", &mut config.max_connections_per_ip, |n| *n > 0, "> 0");
        env_override("MAX_MESSAGES_PER_SECOND", &mut config.max_messages_per_second, |n| *n > 0, "> 0");

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.port == self.metrics_port {
            return Err(format!("PORT and METRICS_PORT are both {}", self.port));
        }
        if self.log_cache_size == 0 {
            return Err("log_cache_size must be at least 1".to_string());
        }
        if !self.game_logs.is_dir() {
            return Err(format!("Game log directory {} does not exist", self.game_logs.display()));
        }
        Ok(())
    }
}

/// Viewer configuration
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// `host:port` of the replay server
    pub server_address: String,
    /// Game to open
    pub game_id: Option<GameId>,
    pub back_window: usize,
    pub forward_window: usize,
    /// Game time per frame in milliseconds
    pub frame_period_ms: f64,
    /// Render ticks per second
    pub render_rate: u32,
    /// Start playing as soon as the game loads
    pub autoplay: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_address: format!("127.0.0.1:{}", net::DEFAULT_PORT),
            game_id: None,
            back_window: window::BACK,
            forward_window: window::FORWARD,
            frame_period_ms: timing::FRAME_PERIOD_MS,
            render_rate: timing::RENDER_RATE,
            autoplay: false,
        }
    }
}

impl ViewerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SERVER_ADDRESS") {
            if addr.trim().is_empty() {
                tracing::warn!("SERVER_ADDRESS is empty, using default");
            } else {
                config.server_address = addr.trim().to_string();
            }
        }

        if let Ok(id) = std::env::var("GAME_ID") {
            match id.parse::<GameId>() {
                Ok(parsed) => config.game_id = Some(parsed),
                Err(_) => tracing::warn!("Invalid GAME_ID '{}'", id),
            }
        }

        env_override("BACK_WINDOW", &mut config.back_window, |_| true, "a frame count");
        env_override("FORWARD_WINDOW", &mut config.forward_window, |_| true, "a frame count");
        env_override(
            "FRAME_PERIOD_MS",
            &mut config.frame_period_ms,
            |p| p.is_finite() && *p > 0.0,
            "positive",
        );
        env_override("RENDER_RATE", &mut config.render_rate, |r| (1..=1000).contains(r), "1-1000");

        if let Ok(flag) = std::env::var("AUTOPLAY") {
            match parse_flag(&flag) {
                Some(parsed) => config.autoplay = parsed,
                None => tracing::warn!("Invalid AUTOPLAY '{}', using default", flag),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.game_id.is_none() {
            return Err("No game selected (set GAME_ID or pass it as the first argument)".to_string());
        }
        if !self.frame_period_ms.is_finite() || self.frame_period_ms <= 0.0 {
            return Err("frame_period_ms must be positive".to_string());
        }
        if self.render_rate == 0 {
            return Err("render_rate must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            frame_period_ms: self.frame_period_ms,
            window: RetentionWindow::new(self.back_window, self.forward_window),
            autoplay: self.autoplay,
        }
    }

    /// Milliseconds between render ticks
    pub fn render_tick_ms(&self) -> u64 {
        (1000 / self.render_rate.max(1) as u64).max(1)
    }
}
