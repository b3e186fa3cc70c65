//! Database Retry Logic
//!
//! Reruns a whole catalog write while SQLite reports the database busy or
//! locked. The budget is `max_lock_wait_ms` from
//! [`refcat_common::config::CatalogConfig`].

use refcat_common::Result;
use std::time::{Duration, Instant};

const FIRST_DELAY_MS: u64 = 10;
const MAX_DELAY_MS: u64 = 1000;
/// Retries that end past this are reported at WARN
const SLOW_RETRY_MS: u128 = 2000;

/// Delay after `current`, doubling up to [`MAX_DELAY_MS`]
fn next_delay_ms(current: u64) -> u64 {
    current.saturating_mul(2).min(MAX_DELAY_MS)
}

/// Run `operation` until it succeeds, fails with anything other than lock
/// contention, or `max_wait_ms` has passed. The last lock error is
/// returned once the budget is spent.
///
/// Each call of `operation` must be a complete unit of work, usually one
/// whole transaction.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut delay_ms = FIRST_DELAY_MS;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    let elapsed_ms = started.elapsed().as_millis();
                    if elapsed_ms > SLOW_RETRY_MS {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Catalog write went through after a long lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Catalog write went through after lock wait"
                        );
                    }
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let elapsed = started.elapsed();
        if elapsed >= budget {
            tracing::error!(
                operation = operation_name,
                attempt,
                elapsed_ms = elapsed.as_millis(),
                max_wait_ms,
                "Catalog write gave up waiting for the database lock"
            );
            return Err(err);
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            delay_ms,
            remaining_ms = budget.saturating_sub(elapsed).as_millis(),
            "Database busy, retrying catalog write"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        delay_ms = next_delay_ms(delay_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refcat_common::Error;

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let mut delay = FIRST_DELAY_MS;
        let mut seen = vec![delay];
        for _ in 0..8 {
            delay = next_delay_ms(delay);
            seen.push(delay);
        }
        assert_eq!(seen, vec![10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let mut attempts = 0;

        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async move { Err::<i32, Error>(Error::not_found("ref_entry", "x")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_lock_text_outside_database_error_is_not_retried() {
        let mut attempts = 0;

        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async move { Err::<i32, Error>(Error::Internal("database is locked".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
