//! Prometheus-compatible metrics endpoint
//!
//! Exposes replay server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, debug};

use crate::store::CacheStats;

const LATENCY_HISTORY: usize = 1000;

/// Metrics registry for the replay server
#[derive(Debug)]
pub struct Metrics {
    // Network stats
    pub connections_active: AtomicU64,
    pub connections_total: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    // Requests served
    pub game_lists_served: AtomicU64,
    pub game_infos_served: AtomicU64,
    pub frames_served: AtomicU64,
    pub request_errors: AtomicU64,

    // Log cache, mirrored from the store on export
    pub log_cache_hits: AtomicU64,
    pub log_cache_misses: AtomicU64,

    // Request latency (microseconds)
    pub request_time_us: AtomicU64,
    pub request_time_p95_us: AtomicU64,
    pub request_time_p99_us: AtomicU64,
    pub request_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling request times for percentile calculation
    request_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            game_lists_served: AtomicU64::new(0),
            game_infos_served: AtomicU64::new(0),
            frames_served: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            log_cache_hits: AtomicU64::new(0),
            log_cache_misses: AtomicU64::new(0),
            request_time_us: AtomicU64::new(0),
            request_time_p95_us: AtomicU64::new(0),
            request_time_p99_us: AtomicU64::new(0),
            request_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            request_history: RwLock::new(VecDeque::with_capacity(LATENCY_HISTORY)),
        }
    }

    /// Record how long one request took and update percentiles
    pub fn record_request_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.request_time_us.store(us, Ordering::Relaxed);

        let mut history = self.request_history.write();
        history.push_back(us);
        while history.len() > LATENCY_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.request_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.request_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.request_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Copy the store's cache counters
    pub fn sync_cache_stats(&self, stats: CacheStats) {
        self.log_cache_hits.store(stats.hits, Ordering::Relaxed);
        self.log_cache_misses.store(stats.misses, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Network metrics
        metric!("replay_connections_active", "Open viewer connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("replay_connections_total", "Viewer connections accepted", "counter",
            self.connections_total.load(Ordering::Relaxed));
        metric!("replay_connections_rejected_total", "Viewer connections refused by per-IP limits", "counter",
            self.connections_rejected.load(Ordering::Relaxed));
        metric!("replay_messages_sent_total", "Total messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("replay_messages_received_total", "Total messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("replay_messages_dropped_total", "Messages dropped by rate limiting or decode errors", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("replay_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("replay_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));

        // Request metrics
        metric!("replay_game_lists_served_total", "Game listings served", "counter",
            self.game_lists_served.load(Ordering::Relaxed));
        metric!("replay_game_infos_served_total", "Game headers served", "counter",
            self.game_infos_served.load(Ordering::Relaxed));
        metric!("replay_frames_served_total", "Frames served", "counter",
            self.frames_served.load(Ordering::Relaxed));
        metric!("replay_request_errors_total", "Requests answered with an error", "counter",
            self.request_errors.load(Ordering::Relaxed));

        // Log cache
        metric!("replay_log_cache_hits_total", "Game log cache hits", "counter",
            self.log_cache_hits.load(Ordering::Relaxed));
        metric!("replay_log_cache_misses_total", "Game log cache misses", "counter",
            self.log_cache_misses.load(Ordering::Relaxed));

        // Latency
        metric!("replay_request_time_microseconds", "Last request time in microseconds", "gauge",
            self.request_time_us.load(Ordering::Relaxed));
        metric!("replay_request_time_p95_microseconds", "95th percentile request time", "gauge",
            self.request_time_p95_us.load(Ordering::Relaxed));
        metric!("replay_request_time_p99_microseconds", "99th percentile request time", "gauge",
            self.request_time_p99_us.load(Ordering::Relaxed));
        metric!("replay_request_time_max_microseconds", "Maximum request time", "gauge",
            self.request_time_max_us.load(Ordering::Relaxed));

        metric!("replay_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        format!(r#"{{
  "network": {{
    "connections": {},
    "connections_total": {},
    "connections_rejected": {},
    "messages_sent": {},
    "messages_received": {},
    "messages_dropped": {},
    "bytes_sent": {},
    "bytes_received": {}
  }},
  "requests": {{
    "game_lists": {},
    "game_infos": {},
    "frames": {},
    "errors": {},
    "request_time_us": {},
    "request_time_p95_us": {},
    "request_time_p99_us": {},
    "request_time_max_us": {}
  }},
  "log_cache": {{
    "hits": {},
    "misses": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.connections_active.load(Ordering::Relaxed),
            self.connections_total.load(Ordering::Relaxed),
            self.connections_rejected.load(Ordering::Relaxed),
            self.messages_sent.load(Ordering::Relaxed),
            self.messages_received.load(Ordering::Relaxed),
            self.messages_dropped.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.game_lists_served.load(Ordering::Relaxed),
            self.game_infos_served.load(Ordering::Relaxed),
            self.frames_served.load(Ordering::Relaxed),
            self.request_errors.load(Ordering::Relaxed),
            self.request_time_us.load(Ordering::Relaxed),
            self.request_time_p95_us.load(Ordering::Relaxed),
            self.request_time_p99_us.load(Ordering::Relaxed),
            self.request_time_max_us.load(Ordering::Relaxed),
            self.log_cache_hits.load(Ordering::Relaxed),
            self.log_cache_misses.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // Most specific paths first
                    let response = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
