use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

/// Jittered exponential backoff for ledger writes that hit a busy or flaky database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_base = base_delay_ms.max(1);
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: clamped_base,
            max_delay_ms: max_delay_ms.max(clamped_base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Policy with a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1, 1, 1, 0.0)
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let jittered = if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rand::thread_rng().gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    /// Run `op` until it succeeds, `should_retry` rejects the error, or attempts run out.
    /// Returns the last error together with the number of attempts made.
    pub async fn retry_async<F, Fut, T, E, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<T, (E, usize)>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err((err, attempt));
                    }
                    let delay = self.next_delay(attempt - 1);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 20, 1_000, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy::new(5, 1, 2, 0.0);
        let calls = AtomicUsize::new(0);

        let result: Result<usize, (&str, usize)> = policy
            .retry_async(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 { Err("busy") } else { Ok(attempt) }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let policy = RetryPolicy::new(3, 1, 2, 0.0);
        let result: Result<(), (&str, usize)> = policy
            .retry_async(|_| async { Err("busy") }, |_| true)
            .await;
        assert_eq!(result, Err(("busy", 3)));
    }

    #[tokio::test]
    async fn does_not_retry_fatal_errors() {
        let policy = RetryPolicy::new(5, 1, 2, 0.0);
        let result: Result<(), (&str, usize)> = policy
            .retry_async(|_| async { Err("fatal") }, |err| *err != "fatal")
            .await;
        assert_eq!(result, Err(("fatal", 1)));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(10, 100, 400, 0.0);
        assert_eq!(policy.next_delay(0), Duration::from_millis(100));
        assert_eq!(policy.next_delay(1), Duration::from_millis(200));
        assert_eq!(policy.next_delay(5), Duration::from_millis(400));
    }
}
