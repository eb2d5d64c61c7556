//! Admission deadline and cancellation for store reads
//!
//! The API server gives a webhook a fixed budget per request. Every read
//! runs under a [`ReadDeadline`] so that a slow store turns into an error
//! the caller can act on instead of a hung request.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Cancellation signal and deadline shared by all reads of one admission
#[derive(Clone, Debug)]
pub struct ReadDeadline {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl ReadDeadline {
    /// Deadline `timeout` from now, cancelled through `token`
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Deadline `timeout` from now with a private token
    pub fn after(timeout: Duration) -> Self {
        Self::new(CancellationToken::new(), timeout)
    }

    /// The token reads are cancelled through
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run `read`, aborting on cancellation or when the deadline passes
    ///
    /// Cancellation is checked first, so an already-cancelled deadline never
    /// polls the read.
    pub async fn run<T, F>(&self, operation: &str, read: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::cancelled(operation)),
            _ = tokio::time::sleep_until(self.deadline) => {
                Err(Error::deadline_exceeded(operation, self.timeout))
            }
            result = read => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_read_passes_through() {
        let deadline = ReadDeadline::after(Duration::from_secs(5));
        let value = deadline.run("read", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn read_errors_pass_through_unchanged() {
        let deadline = ReadDeadline::after(Duration::from_secs(5));
        let err = deadline
            .run::<(), _>("read", async { Err(Error::validation("nope")) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_read() {
        let deadline = ReadDeadline::after(Duration::from_secs(5));
        deadline.token().cancel();
        let err = deadline
            .run("list_network_profiles", std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { ref operation } if operation == "list_network_profiles"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_slow_read() {
        let deadline = ReadDeadline::after(Duration::from_secs(10));
        let err = deadline
            .run("get_attachment_record", std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DeadlineExceeded { timeout, .. } if timeout == Duration::from_secs(10)
        ));
    }
}
