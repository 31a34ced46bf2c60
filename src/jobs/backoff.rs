use rand::Rng;
use std::time::Duration;

/// Exponent cap: beyond this the delay stops growing.
const MAX_EXPONENT: u32 = 10;

/// `base * 2^attempt`, with the exponent capped.
pub fn exponential(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.min(MAX_EXPONENT)))
}

/// Scales `delay` by a random factor in [0.7, 1.3).
pub fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.7..1.3);
    delay.mul_f64(factor)
}

/// Delay before re-running a failed job: exponential with ±30% jitter,
/// rounded to whole seconds.
pub fn calculate_backoff_delay(attempt: i32, base_delay_secs: u32) -> Duration {
    let attempt = attempt.max(0) as u32;
    let delay = with_jitter(exponential(
        Duration::from_secs(base_delay_secs as u64),
        attempt,
    ));
    Duration::from_secs(delay.as_secs_f64().round() as u64)
}
