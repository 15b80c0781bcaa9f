//! Exponential backoff with jitter for gateway handshake retries.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;

/// Delay before retry number `attempt` (1-based). Attempt 0 is the first
/// handshake and never waits.
///
/// `base_delay` doubles per retry up to `max_delay`, then up to 10% is added
/// so restarted bots don't reconnect in lockstep.
pub(crate) fn delay_for(policy: &RetryPolicy, attempt: u32) -> Duration {
    let Some(doublings) = attempt.checked_sub(1) else {
        return Duration::ZERO;
    };

    let delay = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(doublings))
        .min(policy.max_delay);

    delay + delay.mul_f64(rand::thread_rng().gen_range(0.0..0.1))
}
