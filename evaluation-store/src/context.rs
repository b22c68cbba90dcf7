use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::EvaluationStoreError;

/// Per-call invocation context: a cancellation signal plus an optional
/// deadline, both owned by the caller.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Drives `fut` until it completes, the token is canceled, or the
    /// deadline passes, whichever comes first.
    ///
    /// On cancellation or deadline the future is dropped before returning,
    /// so whatever it holds (row stream, pooled connection) is released.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, EvaluationStoreError>
    where
        F: Future<Output = Result<T, EvaluationStoreError>>,
    {
        if self.is_canceled() {
            return Err(EvaluationStoreError::Canceled);
        }
        if matches!(self.deadline, Some(deadline) if deadline <= Instant::now()) {
            return Err(EvaluationStoreError::DeadlineExceeded);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(EvaluationStoreError::Canceled),
            _ = deadline => Err(EvaluationStoreError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_run_returns_future_result() {
        let ctx = EvaluationContext::new();
        let result = ctx.run(async { Ok::<_, EvaluationStoreError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_propagates_future_error() {
        let ctx = EvaluationContext::new();
        let result = ctx
            .run(async { Err::<(), _>(EvaluationStoreError::DatabaseUnavailable) })
            .await;
        assert!(matches!(
            result,
            Err(EvaluationStoreError::DatabaseUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_already_canceled_context_never_polls_future() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = EvaluationContext::new().with_cancellation(token);

        let polled = AtomicBool::new(false);
        let result = ctx
            .run(async {
                polled.store(true, Ordering::SeqCst);
                Ok::<(), EvaluationStoreError>(())
            })
            .await;
        assert!(!polled.load(Ordering::SeqCst));
        assert!(matches!(result, Err(EvaluationStoreError::Canceled)));
    }

    #[tokio::test]
    async fn test_cancel_mid_flight_aborts() {
        let token = CancellationToken::new();
        let ctx = EvaluationContext::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), EvaluationStoreError>(())
            })
            .await;
        assert!(matches!(result, Err(EvaluationStoreError::Canceled)));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_slow_future() {
        let ctx = EvaluationContext::new().with_timeout(Duration::from_millis(50));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), EvaluationStoreError>(())
            })
            .await;
        assert!(matches!(result, Err(EvaluationStoreError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_fails_immediately() {
        let ctx = EvaluationContext::new().with_deadline(Instant::now());
        let result = ctx.run(async { Ok::<_, EvaluationStoreError>(1) }).await;
        assert!(matches!(result, Err(EvaluationStoreError::DeadlineExceeded)));
    }
}
