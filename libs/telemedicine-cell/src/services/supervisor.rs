// libs/telemedicine-cell/src/services/supervisor.rs
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use shared_config::AppConfig;

use crate::error::TelemedicineError;
use crate::services::signaling::SignalingChannel;

const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.realtime_reconnect_max_attempts.max(1),
            initial_backoff: config.reconnect_backoff(),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            multiplier: 2,
        }
    }

    /// Base delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Retries `SignalingChannel::connect` on transient failures.
///
/// The channel itself never retries; a failed subscribe leaves it `Idle`, which is
/// what lets the supervisor try again on the same instance.
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
}

impl ReconnectSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(ReconnectPolicy::from_config(config))
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Returns the number of attempts it took to connect.
    pub async fn connect(
        &self,
        channel: &SignalingChannel,
        room_id: &str,
    ) -> Result<u32, TelemedicineError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match channel.connect(room_id).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!("Connected to room {} after {} attempts", room_id, attempt);
                    }
                    return Ok(attempt);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.policy.max_attempts => {
                    error!(
                        "Giving up on room {} after {} attempts: {}",
                        room_id, attempt, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.jittered(self.policy.delay_for(attempt));
                    warn!(
                        "Connect to room {} failed: {}. Retrying in {}ms (attempt {}/{})",
                        room_id,
                        e,
                        delay.as_millis(),
                        attempt,
                        self.policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn jittered(&self, base: Duration) -> Duration {
        let spread = base.as_millis() as u64 / 2;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(3_000),
            multiplier: 2,
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(64), Duration::from_millis(3_000));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
    }
}
