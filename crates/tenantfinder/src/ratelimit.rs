use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

// region:        --- Rate specs

/// `max_requests` requests allowed in any sliding window of `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub max_requests: u32,
    pub window: Duration,
}

impl Rate {
    /// `None` when `max_requests` is zero, which means unlimited.
    pub fn new(max_requests: u32, window: Duration) -> Option<Self> {
        (max_requests > 0 && !window.is_zero()).then_some(Self {
            max_requests,
            window,
        })
    }

    pub fn per_second(max_requests: u32) -> Option<Self> {
        Self::new(max_requests, Duration::from_secs(1))
    }
}

/// Per-source override, written `<source>=<count>/<unit>` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSpec {
    pub source: String,
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitSpec {
    pub fn new(source: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            source: source.into(),
            max_requests,
            window,
        }
    }

    pub fn rate(&self) -> Option<Rate> {
        Rate::new(self.max_requests, self.window)
    }
}

impl FromStr for RateLimitSpec {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidRateLimit(value.to_string());

        let (source, limit) = value.split_once('=').ok_or_else(invalid)?;
        let source = source.trim().to_lowercase();
        if source.is_empty() {
            return Err(invalid());
        }

        let (count, unit) = match limit.split_once('/') {
            Some((count, unit)) => (count, unit),
            None => (limit, "s"),
        };
        let max_requests: u32 = count.trim().parse().map_err(|_| invalid())?;
        if max_requests == 0 {
            return Err(invalid());
        }
        let window = match unit.trim() {
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(60 * 60),
            _ => return Err(invalid()),
        };

        Ok(Self::new(source, max_requests, window))
    }
}

// endregion:     --- Rate specs

// region:        --- Limiter

/// Request accounting shared by every source task and every enumeration.
///
/// Each limited source keeps a log of the instants its tokens were handed out;
/// a token is granted only when fewer than `max_requests` of them fall inside
/// the last `window`.
#[derive(Debug)]
pub struct RateLimiter {
    default: Option<Rate>,
    overrides: HashMap<String, Rate>,
    issued: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(default: Option<Rate>, overrides: impl IntoIterator<Item = RateLimitSpec>) -> Self {
        let overrides = overrides
            .into_iter()
            .filter_map(|spec| spec.rate().map(|rate| (spec.source, rate)))
            .collect();
        Self {
            default,
            overrides,
            issued: Mutex::new(HashMap::new()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, Vec::new())
    }

    pub fn rate_for(&self, source: &str) -> Option<Rate> {
        self.overrides.get(source).copied().or(self.default)
    }

    /// Waits until `source` may issue one more request.
    pub async fn acquire(&self, source: &str) {
        let Some(rate) = self.rate_for(source) else {
            return;
        };

        loop {
            let wake_at = {
                let mut issued = self.issued.lock().await;
                let log = issued.entry(source.to_string()).or_default();
                let now = Instant::now();

                while let Some(&oldest) = log.front() {
                    if now.duration_since(oldest) >= rate.window {
                        log.pop_front();
                    } else {
                        break;
                    }
                }

                if log.len() < rate.max_requests as usize {
                    log.push_back(now);
                    trace!(source = source, in_window = log.len(), "token granted");
                    return;
                }

                match log.front() {
                    Some(&oldest) => oldest + rate.window,
                    None => now,
                }
            };

            debug!(
                source = source,
                "rate limited, waiting {:?}",
                wake_at.saturating_duration_since(Instant::now())
            );
            sleep_until(wake_at).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

// endregion:     --- Limiter
