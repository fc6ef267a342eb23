//! Fixed-interval reconnection after an I/O failure

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::transport::{Transport, TransportError};

/// Delay between reconnect attempts
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// How a reconnect loop ended
#[derive(Debug)]
pub enum Reconnect {
    Connected { attempts: u32 },
    Cancelled,
    /// A failure that retrying will not fix
    Unavailable(TransportError),
}

/// Sleep for `duration` unless cancelled first
///
/// Returns false if cancelled.
pub fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

/// Try to connect every `interval` until success or cancellation
///
/// Attempts are unbounded. Individual failures are logged at debug level;
/// the caller logs the transitions.
pub fn reconnect(
    transport: &mut dyn Transport,
    interval: Duration,
    cancel: &CancellationToken,
) -> Reconnect {
    let mut attempts = 0u32;
    loop {
        if !sleep_cancellable(interval, cancel) {
            return Reconnect::Cancelled;
        }
        attempts = attempts.saturating_add(1);
        match transport.connect(cancel) {
            Ok(()) => return Reconnect::Connected { attempts },
            Err(_) if cancel.is_cancelled() => return Reconnect::Cancelled,
            Err(e) if !e.is_transient() => return Reconnect::Unavailable(e),
            Err(e) => debug!(attempt = attempts, %e, "reconnect attempt failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::RawEvent;

    struct Flaky {
        results: Vec<Result<(), TransportError>>,
    }

    impl Transport for Flaky {
        fn connect(&mut self, _cancel: &CancellationToken) -> Result<(), TransportError> {
            if self.results.is_empty() {
                Ok(())
            } else {
                self.results.remove(0)
            }
        }

        fn poll(&mut self, _cancel: &CancellationToken) -> Result<Vec<RawEvent>, TransportError> {
            Ok(Vec::new())
        }

        fn disconnect(&mut self) {}
    }

    #[test]
    fn test_retries_until_connected() {
        let mut transport = Flaky {
            results: vec![Err(TransportError::NotFound), Err(TransportError::Io("x".into()))],
        };
        let cancel = CancellationToken::new();
        let outcome = reconnect(&mut transport, Duration::from_millis(1), &cancel);
        assert!(matches!(outcome, Reconnect::Connected { attempts: 3 }));
    }

    #[test]
    fn test_permanent_failure_stops_retrying() {
        let mut transport = Flaky {
            results: vec![Err(TransportError::Unavailable("denied".into()))],
        };
        let cancel = CancellationToken::new();
        let outcome = reconnect(&mut transport, Duration::from_millis(1), &cancel);
        assert!(matches!(outcome, Reconnect::Unavailable(_)));
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        let started = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });
        assert!(!sleep_cancellable(Duration::from_secs(10), &cancel));
        assert!(started.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();

        let mut transport = Flaky { results: vec![] };
        assert!(matches!(
            reconnect(&mut transport, RECONNECT_INTERVAL, &cancel),
            Reconnect::Cancelled
        ));
    }
}
