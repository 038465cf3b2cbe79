use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tandem_shared::{constants::USER_ID_HEADER, UserId};
use tokio::sync::Mutex;
use tracing::warn;

/// Who a request is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateKey {
    User(UserId),
    Ip(IpAddr),
}

impl std::fmt::Display for RateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateKey::User(user) => write!(f, "user:{}", user.short()),
            RateKey::Ip(ip) => write!(f, "ip:{ip}"),
        }
    }
}

/// Per-caller schedule for the generic cell rate algorithm: the theoretical
/// arrival time of the next request.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    next_arrival: Instant,
    last_seen: Instant,
}

/// GCRA limiter. A caller may run `burst` requests ahead of the steady
/// `per_sec` schedule before being refused.
#[derive(Clone)]
pub struct RateLimiter {
    schedules: Arc<Mutex<HashMap<RateKey, Schedule>>>,
    interval: Duration,
    tolerance: Duration,
    trust_user_header: bool,
}

impl RateLimiter {
    pub fn new(per_sec: f64, burst: f64) -> Self {
        let interval = Duration::from_secs_f64(1.0 / per_sec.max(f64::MIN_POSITIVE));
        let tolerance = interval.mul_f64((burst - 1.0).max(0.0));
        Self {
            schedules: Arc::new(Mutex::new(HashMap::new())),
            interval,
            tolerance,
            trust_user_header: false,
        }
    }

    /// Charge requests to the `x-user-id` header instead of the client
    /// address. Only sound when the identity proxy in front of this server
    /// strips any client-supplied copy of that header.
    pub fn trusting_user_header(mut self, trusted: bool) -> Self {
        self.trust_user_header = trusted;
        self
    }

    pub async fn check(&self, key: RateKey) -> bool {
        let now = Instant::now();
        let mut schedules = self.schedules.lock().await;
        let schedule = schedules.entry(key).or_insert(Schedule {
            next_arrival: now,
            last_seen: now,
        });
        schedule.last_seen = now;

        let arrival = schedule.next_arrival.max(now);
        if arrival.duration_since(now) > self.tolerance {
            return false;
        }
        schedule.next_arrival = arrival + self.interval;
        true
    }

    /// Drop schedules whose caller has been silent for `max_idle_secs`.
    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut schedules = self.schedules.lock().await;
        let now = Instant::now();
        schedules.retain(|_, schedule| {
            now.duration_since(schedule.last_seen).as_secs_f64() < max_idle_secs
        });
    }

    fn key_for<B>(&self, req: &Request<B>) -> Option<RateKey> {
        if self.trust_user_header {
            let user = req
                .headers()
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<UserId>().ok());
            if let Some(user) = user {
                return Some(RateKey::User(user));
            }
        }
        extract_client_ip(req).map(RateKey::Ip)
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(key) = limiter.key_for(&req) {
        if !limiter.check(key).await {
            warn!(%key, "Rate limit exceeded");
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
    }

    Ok(next.run(req).await)
}

/// Try ConnectInfo first, then X-Forwarded-For, then X-Real-IP.
fn extract_client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    let header_ip = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for").or_else(|| header_ip("x-real-ip"))
}
