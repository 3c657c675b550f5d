//! Fixed-delay retry loop used by the bulk engine's `transactWrite` retries
//! (50ms, up to 3 attempts) and available to callers needing the same shape
//! with different numbers.

use std::time::Duration;

/// Retries `attempt` up to `max_attempts` times, sleeping `delay` between
/// tries. `should_retry` is consulted on each error; returning `false` stops
/// retrying immediately and returns that error (used for deterministic
/// cancellation errors that a delay can't fix).
pub async fn retry_fixed_delay<T, E, F, Fut, R>(
    max_attempts: usize,
    delay: Duration,
    should_retry: R,
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                tries += 1;
                if tries >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_fixed_delay(
            3,
            Duration::from_millis(1),
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            },
        )
        .await;

        assert_eq!(result, Err("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_when_should_retry_false() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), &str> = retry_fixed_delay(
            3,
            Duration::from_millis(1),
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_second_try() {
        let calls = AtomicUsize::new(0);
        let result = retry_fixed_delay(
            3,
            Duration::from_millis(1),
            |_: &&str| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err("transient") } else { Ok(42) } }
            },
        )
        .await;

        assert_eq!(result, Ok(42));
    }
}
