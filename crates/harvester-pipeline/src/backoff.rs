//! Reconnect delays for the live stream.

use std::time::Duration;

const MAX_DELAY_MS: u64 = 60_000;

/// Delay before reconnect number `attempt + 1`: `base * 2^attempt`, capped at
/// 60 s, then scaled by a random factor in `[0.75, 1.25)`.
pub(crate) fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let computed = base_ms.saturating_mul(1u64 << attempt.min(10));
    let capped = computed.min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    Duration::from_millis(delay_ms)
}
