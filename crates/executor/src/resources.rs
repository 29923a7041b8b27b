//! Invocation concurrency limit

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide cap on concurrently running invocations
#[derive(Clone, Debug)]
pub struct InvocationLimiter {
    semaphore: Arc<Semaphore>,
}

impl InvocationLimiter {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Wait for a permit; `None` if the semaphore was closed
    pub async fn acquire(&self, operation: &str) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(operation, "invocation limiter closed");
                None
            }
        }
    }

    /// Permits currently free
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limiter() {
        let limiter = InvocationLimiter::new(2);
        let first = limiter.acquire("a").await.unwrap();
        let _second = limiter.acquire("b").await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_zero_is_clamped() {
        assert_eq!(InvocationLimiter::new(0).available(), 1);
    }
}
