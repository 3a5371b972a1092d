//! Bounded-time execution of calls into external collaborators.
//!
//! The call runs on a helper thread; the caller waits at most `timeout` for
//! the answer. A call that overruns keeps running in the background and its
//! late result is discarded. A zero timeout leaves no time at all: the call
//! is not started and the result is [`CallFailure::TimedOut`].

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// Why a bounded call produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFailure {
    /// The deadline passed first.
    TimedOut,
    /// The call panicked.
    Panicked,
}

/// Run `f`, waiting at most `timeout` for its result.
pub fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, CallFailure>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if timeout.is_zero() {
        return Err(CallFailure::TimedOut);
    }

    let (tx, rx) = mpsc::sync_channel(1);
    let spawned = std::thread::Builder::new()
        .name("ontoguard-call".into())
        .spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(f());
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "could not spawn bounded call thread");
        return Err(CallFailure::Panicked);
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(CallFailure::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(CallFailure::Panicked),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_call_returns_value() {
        let v = run_with_timeout(Duration::from_secs(1), || 41 + 1).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn slow_call_times_out() {
        let r = run_with_timeout(Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_millis(200));
            1
        });
        assert_eq!(r, Err(CallFailure::TimedOut));
    }

    #[test]
    fn panicking_call_is_reported() {
        let r: Result<(), _> = run_with_timeout(Duration::from_secs(1), || panic!("boom"));
        assert_eq!(r, Err(CallFailure::Panicked));
    }

    #[test]
    fn zero_timeout_never_runs_the_call() {
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&ran);
        let r = run_with_timeout(Duration::ZERO, move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst)
        });
        assert_eq!(r, Err(CallFailure::TimedOut));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
