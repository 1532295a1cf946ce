//! Fire-and-forget emission dispatch with a bounded worker pool.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::stats::RunStats;
use crate::transport::Transport;

/// Outcome of handing one emission to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A task was spawned to send the payload.
    Sent,
    /// Every slot was busy; the emission was counted and skipped.
    Dropped,
}

/// Sends payloads on spawned tasks so the timing loop never waits on the
/// network. At most `max_in_flight` requests are outstanding at once, across
/// all runs.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, max_in_flight: usize) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Requests currently being sent.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Send `payload` to `endpoint` without waiting for the response.
    ///
    /// Never blocks: if the pool is exhausted the emission is dropped.
    pub fn dispatch(&self, endpoint: Arc<str>, payload: Bytes, stats: Arc<RunStats>) -> Dispatch {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                stats.record_dropped();
                counter!("ddosy_dispatch_total", "outcome" => "dropped").increment(1);
                return Dispatch::Dropped;
            }
        };

        stats.record_emitted();
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let _permit = permit;
            match transport.send(&endpoint, payload).await {
                Ok(()) => {
                    stats.record_success();
                    counter!("ddosy_dispatch_total", "outcome" => "success").increment(1);
                }
                Err(e) => {
                    stats.record_failure();
                    counter!("ddosy_dispatch_total", "outcome" => e.kind()).increment(1);
                    debug!(endpoint = %endpoint, error = %e, "Dispatch failed");
                }
            }
        });

        Dispatch::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Holds every request until released.
    struct GatedTransport {
        gate: Notify,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _endpoint: &str, _payload: Bytes) -> Result<(), DispatchError> {
            self.gate.notified().await;
            Ok(())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _endpoint: &str, _payload: Bytes) -> Result<(), DispatchError> {
            Err(DispatchError::Status(500))
        }
    }

    #[tokio::test]
    async fn test_pool_bounds_in_flight() {
        let transport = Arc::new(GatedTransport {
            gate: Notify::new(),
        });
        let dispatcher = Dispatcher::new(transport.clone(), 2);
        let stats = Arc::new(RunStats::new());
        let endpoint: Arc<str> = Arc::from("http://target");

        let outcomes: Vec<Dispatch> = (0..4)
            .map(|_| dispatcher.dispatch(endpoint.clone(), Bytes::new(), stats.clone()))
            .collect();

        assert_eq!(
            outcomes,
            vec![Dispatch::Sent, Dispatch::Sent, Dispatch::Dropped, Dispatch::Dropped]
        );
        assert_eq!(dispatcher.in_flight(), 2);

        let snap = stats.snapshot();
        assert_eq!(snap.emitted, 2);
        assert_eq!(snap.dropped, 2);

        transport.gate.notify_waiters();
        for _ in 0..50 {
            if dispatcher.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            transport.gate.notify_waiters();
        }
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(stats.snapshot().succeeded, 2);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let dispatcher = Dispatcher::new(Arc::new(FailingTransport), 8);
        let stats = Arc::new(RunStats::new());

        for _ in 0..3 {
            dispatcher.dispatch(Arc::from("http://target"), Bytes::new(), stats.clone());
        }
        for _ in 0..50 {
            if stats.snapshot().failed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snap = stats.snapshot();
        assert_eq!(snap.failed, 3);
        assert_eq!(snap.succeeded, 0);
    }
}
