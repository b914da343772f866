use std::time::Duration;

use rand::Rng;

use crate::config::CircuitBreakerConfig;

/// Exponential backoff delay with 25% jitter, capped at `max_delay`.
///
/// `base_delay * 2^attempt`, then uniform jitter in [-25%, +25%]. A hard
/// floor of 100ms prevents degenerate tight-loop retries.
pub(crate) fn backoff_delay(config: &CircuitBreakerConfig, attempt: u32) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    let capped_ms = exp_ms.min(config.max_delay.as_millis() as u64);

    let jitter_range = capped_ms / 4;
    let jitter = if jitter_range > 0 {
        let offset = rand::thread_rng().gen_range(0..=jitter_range.saturating_mul(2));
        offset as i64 - jitter_range as i64
    } else {
        0
    };
    let delay_ms = (capped_ms as i64 + jitter).max(100) as u64;
    Duration::from_millis(delay_ms)
}
