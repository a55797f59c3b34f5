use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::provider::ProviderError;

/// Time and cancellation bound applied to every step of a workflow
///
/// Each remote call gets `timeout`. With a budget set, the whole workflow
/// also ends at a fixed instant: no call and no conflict decision may run
/// past it, so an index transaction is never held open longer than that.
#[derive(Debug, Clone)]
pub struct Deadline {
    timeout: Duration,
    expires_at: Option<Instant>,
    cancel: CancellationToken,
}

impl Deadline {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            timeout,
            expires_at: None,
            cancel,
        }
    }

    /// Bound the whole workflow to `budget` from now
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.expires_at = Some(Instant::now() + budget);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if self.is_expired() {
            return Err(ProviderError::Timeout);
        }
        Ok(())
    }

    /// Run one remote call, failing with `Timeout` or `Cancelled` if it
    /// does not finish in time
    pub async fn run<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.check()?;

        let per_call = Instant::now() + self.timeout;
        let bound = match self.expires_at {
            Some(at) => per_call.min(at),
            None => per_call,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout_at(bound, call) => match result {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            },
        }
    }

    /// Wait for a local step, such as an operator's decision, bounded only
    /// by cancellation and the workflow budget
    pub async fn wait<F>(&self, step: F) -> Result<F::Output, ProviderError>
    where
        F: Future,
    {
        self.check()?;

        let expiry = async {
            match self.expires_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
            _ = expiry => Err(ProviderError::Timeout),
            output = step => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let deadline = Deadline::new(Duration::from_secs(12), CancellationToken::new());
        let result: Result<(), _> = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(13)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Timeout)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deadline = Deadline::new(Duration::from_secs(1), cancel);
        let result = deadline.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let deadline = Deadline::new(Duration::from_secs(1), CancellationToken::new());
        assert_eq!(deadline.run(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_caps_each_call() {
        let deadline = Deadline::new(Duration::from_secs(12), CancellationToken::new())
            .with_budget(Duration::from_secs(20));

        tokio::time::sleep(Duration::from_secs(15)).await;
        let start = Instant::now();
        let result: Result<(), _> = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Timeout)));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_budget_refuses_ready_calls() {
        let deadline = Deadline::new(Duration::from_secs(12), CancellationToken::new())
            .with_budget(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(deadline.is_expired());
        assert!(matches!(
            deadline.run(async { Ok(1) }).await,
            Err(ProviderError::Timeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ends_at_budget() {
        let deadline = Deadline::new(Duration::from_secs(12), CancellationToken::new())
            .with_budget(Duration::from_secs(30));

        let start = Instant::now();
        let result = deadline
            .wait(tokio::time::sleep(Duration::from_secs(3600)))
            .await;

        assert!(matches!(result, Err(ProviderError::Timeout)));
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_without_budget_outlasts_timeout() {
        let deadline = Deadline::new(Duration::from_secs(1), CancellationToken::new());
        let answer = deadline
            .wait(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                42
            })
            .await;
        assert_eq!(answer.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled() {
        let cancel = CancellationToken::new();
        let deadline = Deadline::new(Duration::from_secs(1), cancel.clone());

        let trigger = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(
            deadline.wait(tokio::time::sleep(Duration::from_secs(3600))),
            trigger
        );
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
