//! Bounded retry with backoff around [`Transport::send`].

use crate::error::TransportError;
use crate::transport::{Transport, DEFAULT_CONNECT_TIMEOUT};
use bytes::Bytes;
use router_wire::NodeId;
use std::time::Duration;
use tracing::debug;

/// Retry settings for one send
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, at least one
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
    /// Limit for each attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Send `bytes` to `to`, retrying on failure. Returns the last error when
/// every attempt failed.
pub async fn send_with_retry(
    transport: &dyn Transport,
    to: &NodeId,
    bytes: Bytes,
    policy: &RetryPolicy,
) -> Result<(), TransportError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(policy.timeout, transport.send(to, bytes.clone())).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                peer: to.clone(),
                after: policy.timeout,
            }),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                debug!(peer = %to, attempt, "Send failed, retrying: {}", e);
                attempt += 1;
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` sends
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for Flaky {
        async fn send(&self, to: &NodeId, _bytes: Bytes) -> Result<(), TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Unreachable(to.clone()))
            } else {
                Ok(())
            }
        }
    }

    /// Never completes
    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn send(&self, _to: &NodeId, _bytes: Bytes) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let transport = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let result = send_with_retry(&transport, &NodeId::from("B"), Bytes::new(), &RetryPolicy::default()).await;

        assert!(result.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts() {
        let transport = Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let result = send_with_retry(&transport, &NodeId::from("B"), Bytes::new(), &RetryPolicy::default()).await;

        assert!(matches!(result, Err(TransportError::Unreachable(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_is_bounded() {
        let policy = RetryPolicy {
            attempts: 2,
            ..RetryPolicy::default()
        };
        let started = tokio::time::Instant::now();
        let result = send_with_retry(&Stalled, &NodeId::from("B"), Bytes::new(), &policy).await;

        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        let elapsed = started.elapsed();
        assert!(elapsed >= policy.timeout * 2 + policy.backoff);
        assert!(elapsed < policy.timeout * 3);
    }
}
