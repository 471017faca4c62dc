use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classification of store errors into retryable and terminal.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::Interrupted
                | ErrorKind::TimedOut
                | ErrorKind::WouldBlock
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::ResourceBusy
        )
    }
}

pub const MAX_ATTEMPTS: u32 = 6;
const CAP_SECONDS: f64 = 5.0;
const BASE_SECONDS: f64 = 0.1;

/// Retry a store operation on transient errors with jittered exponential
/// backoff, capped at 5s per sleep and 6 attempts total. Non-transient
/// errors surface immediately.
pub async fn with_retries<T, E, F, Fut>(label: &str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if !e.is_transient() || attempt >= MAX_ATTEMPTS {
                    return Err(e);
                }
                let cap = CAP_SECONDS.min(BASE_SECONDS * 2f64.powi(attempt as i32 - 1));
                let sleep = rand::rng().random_range(0.0..=cap.max(f64::EPSILON));
                warn!("{label}: transient error (attempt {attempt}): {e}; retrying in {sleep:.2}s");
                tokio::time::sleep(Duration::from_secs_f64(sleep)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Error> = with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::new(ErrorKind::TimedOut, "slow disk"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Error> = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::new(ErrorKind::PermissionDenied, "no")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Error> = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::new(ErrorKind::TimedOut, "always slow")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
