use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Fixed schedule of delays between attempts of a fallible async operation.
///
/// The default policy makes a single attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    #[must_use]
    pub const fn none() -> Self {
        Self { delays: Vec::new() }
    }

    #[must_use]
    pub const fn with_delays(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    #[must_use]
    pub fn from_secs(delays: &[u64]) -> Self {
        Self::with_delays(delays.iter().copied().map(Duration::from_secs).collect())
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Runs `operation` until it succeeds or the schedule is exhausted.
    ///
    /// Returns the first success, or the error of the last attempt.
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts();

        for (i, delay) in self.delays.iter().enumerate() {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{attempts}): {e}. Retrying after {}ms...",
                        i + 1,
                        delay.as_millis()
                    );
                    sleep(*delay).await;
                }
            }
        }

        operation().await
    }
}
