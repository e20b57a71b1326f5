use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::minutes(1),
            max_attempts: 10,
        }
    }
}

#[derive(Debug)]
struct AttemptWindow {
    count: u32,
    expires: DateTime<Utc>,
}

/// Fixed-window throttle for credential-bearing endpoints, keyed by the
/// presented identity. Counts live in memory alongside the rest of the
/// server state.
pub struct LoginRateLimiter {
    windows: Arc<RwLock<HashMap<String, AttemptWindow>>>,
    config: RateLimitConfig,
}

impl LoginRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Record an attempt for `identity` and report whether it is allowed.
    pub async fn check_attempt(&self, identity: &str) -> bool {
        let mut windows = self.windows.write().await;
        let now = Utc::now();

        match windows.get_mut(identity) {
            Some(window) if window.expires > now => {
                if window.count >= self.config.max_attempts {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                windows.insert(
                    identity.to_string(),
                    AttemptWindow {
                        count: 1,
                        expires: now + self.config.window_size,
                    },
                );
                true
            }
        }
    }

    /// Drop windows that have already expired.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut windows = self.windows.write().await;
        windows.retain(|_, window| window.expires > now);
    }
}
