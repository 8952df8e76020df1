//! Viewer connection limits
//!
//! Caps how many viewers may connect (overall and per address) and how fast
//! each may send requests. A viewer that keeps exceeding its rate collects
//! strikes and is eventually disconnected.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Server-assigned id of one viewer connection
pub type ViewerId = u64;

#[derive(Debug, Clone)]
pub struct ViewerLimits {
    /// Concurrent viewers across all addresses
    pub max_viewers: usize,
    /// Concurrent viewers from one address
    pub max_viewers_per_ip: usize,
    /// Requests accepted per `rate_window`
    pub max_requests_per_window: u32,
    pub rate_window: Duration,
    /// Largest request body accepted; requests are a few bytes
    pub max_request_size: usize,
    /// Rate violations tolerated before the viewer is dropped
    pub strikes_before_disconnect: u32,
}

impl Default for ViewerLimits {
    fn default() -> Self {
        Self {
            max_viewers: 1000,
            max_viewers_per_ip: 8,
            // At most one frame request per render tick, plus seeking bursts
            max_requests_per_window: 400,
            rate_window: Duration::from_secs(1),
            max_request_size: 1024,
            strikes_before_disconnect: 50,
        }
    }
}

/// Requests seen in the current window for one viewer
#[derive(Debug)]
struct RequestMeter {
    window_start: Instant,
    requests: u32,
    strikes: u32,
}

impl RequestMeter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            requests: 0,
            strikes: 0,
        }
    }

    fn record(&mut self, now: Instant, limits: &ViewerLimits) -> Result<(), LimitError> {
        if self.strikes >= limits.strikes_before_disconnect {
            return Err(LimitError::Disconnect {
                strikes: self.strikes,
            });
        }

        if now.saturating_duration_since(self.window_start) >= limits.rate_window {
            self.window_start = now;
            self.requests = 0;
        }

        self.requests += 1;
        if self.requests > limits.max_requests_per_window {
            self.strikes += 1;
            return Err(LimitError::RateExceeded);
        }
        Ok(())
    }
}

/// Admission and request metering for all connected viewers
pub struct ConnectionGuard {
    limits: ViewerLimits,
    per_ip: FxHashMap<IpAddr, usize>,
    meters: FxHashMap<ViewerId, RequestMeter>,
    next_id: ViewerId,
}

impl ConnectionGuard {
    pub fn new(limits: ViewerLimits) -> Self {
        Self {
            limits,
            per_ip: FxHashMap::default(),
            meters: FxHashMap::default(),
            next_id: 1,
        }
    }

    pub fn limits(&self) -> &ViewerLimits {
        &self.limits
    }

    /// Admit a viewer from `ip`, assigning it an id
    pub fn admit(&mut self, ip: IpAddr) -> Result<ViewerId, LimitError> {
        if self.meters.len() >= self.limits.max_viewers {
            return Err(LimitError::ServerFull);
        }
        let from_ip = self.per_ip.entry(ip).or_insert(0);
        if *from_ip >= self.limits.max_viewers_per_ip {
            return Err(LimitError::AddressFull(ip));
        }
        *from_ip += 1;

        let id = self.next_id;
        self.next_id += 1;
        self.meters.insert(id, RequestMeter::new(Instant::now()));
        Ok(id)
    }

    /// Forget a viewer. Releasing twice is harmless.
    pub fn release(&mut self, id: ViewerId, ip: IpAddr) {
        if self.meters.remove(&id).is_none() {
            return;
        }
        if let Some(count) = self.per_ip.get_mut(&ip) {
            *count -= 1;
            if *count == 0 {
                self.per_ip.remove(&ip);
            }
        }
    }

    /// Meter one request of `size` bytes from viewer `id`
    pub fn check_request(&mut self, id: ViewerId, size: usize) -> Result<(), LimitError> {
        if size > self.limits.max_request_size {
            return Err(LimitError::RequestTooLarge(size));
        }
        match self.meters.get_mut(&id) {
            Some(meter) => meter.record(Instant::now(), &self.limits),
            None => Ok(()),
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.meters.len()
    }

    pub fn viewers_from(&self, ip: IpAddr) -> usize {
        self.per_ip.get(&ip).copied().unwrap_or(0)
    }

    pub fn strikes(&self, id: ViewerId) -> u32 {
        self.meters.get(&id).map_or(0, |meter| meter.strikes)
    }
}

impl Default for ConnectionGuard {
    fn default() -> Self {
        Self::new(ViewerLimits::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("server is at its viewer limit")]
    ServerFull,
    #[error("too many viewers from {0}")]
    AddressFull(IpAddr),
    #[error("request of {0} bytes is too large")]
    RequestTooLarge(usize),
    #[error("request rate exceeded")]
    RateExceeded,
    #[error("disconnected after {strikes} rate violations")]
    Disconnect { strikes: u32 },
}

impl LimitError {
    /// Whether the connection should be closed rather than the request dropped
    pub fn is_fatal(&self) -> bool {
        matches!(self, LimitError::Disconnect { .. })
    }
}
