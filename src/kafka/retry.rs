//! Retry policies for changelog appends and reads
//!
//! Both policies are exponential with jitter, starting at the configured
//! `retry_backoff_ms` and capped at [`MAX_RETRY_BACKOFF_MS`].
//!
//! | Policy | Default retries | Used by |
//! |--------|-----------------|---------|
//! | `append_policy` | 5 | `LogWriter::append` |
//! | `consume_policy` | 10 | the tailer's poll loop |
//!
//! The writer drives its policy with `backon::Retryable`. The tailer needs to
//! keep reading between failures, so it pulls delays from the built backoff
//! iterator and rebuilds it after every successful poll.

use std::time::Duration;

use backon::ExponentialBuilder;

use super::constants::MAX_RETRY_BACKOFF_MS;

/// Policy for producing to the changelog
pub fn append_policy(max_retries: usize, min_delay: Duration) -> ExponentialBuilder {
    policy(max_retries, min_delay)
}

/// Policy for consecutive transient poll failures in the tailer
pub fn consume_policy(max_retries: usize, min_delay: Duration) -> ExponentialBuilder {
    policy(max_retries, min_delay)
}

fn policy(max_retries: usize, min_delay: Duration) -> ExponentialBuilder {
    let max_delay = Duration::from_millis(MAX_RETRY_BACKOFF_MS).max(min_delay);
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .with_max_times(max_retries)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::{BackoffBuilder, Retryable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_policy_yields_max_retries_delays() {
        let delays: Vec<Duration> = consume_policy(4, Duration::from_millis(1)).build().collect();
        assert_eq!(delays.len(), 4);
        assert!(delays
            .iter()
            .all(|d| *d <= Duration::from_millis(MAX_RETRY_BACKOFF_MS) * 2));
    }

    #[test]
    fn test_zero_retries_yields_nothing() {
        assert_eq!(append_policy(0, Duration::from_millis(1)).build().count(), 0);
    }

    #[tokio::test]
    async fn test_append_policy_exhausts() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), std::io::Error> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"))
        })
        .retry(append_policy(2, Duration::from_millis(1)))
        .when(|_| true)
        .await;

        assert!(result.is_err());
        // Initial attempt + 2 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
