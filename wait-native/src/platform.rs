//! Platform-specific timer backends
//!
//! Every backend exposes `arm(delay, fire)`, which runs `fire` on a
//! background context no earlier than `delay` from now. Cancellation is
//! layered on top here so the backends stay fire-and-forget.

#[cfg(target_os = "macos")]
use macos as backend;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
use windows as backend;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as backend;
#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
use fallback as backend;
#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
mod fallback;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Revocation handle for a callback scheduled with [`set_timer`]
#[derive(Debug)]
pub(crate) struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Suppress the callback if it has not started running yet
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Schedule `callback` to run no earlier than `delay` from now
pub(crate) fn set_timer<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();

    backend::arm(delay, move || {
        if !flag.load(Ordering::Acquire) {
            callback();
        }
    });

    TimerHandle { cancelled }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::mpsc,
            time::Instant,
        },
    };

    #[test]
    fn test_timer_fires_after_delay() {
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        let _handle = set_timer(Duration::from_millis(30), move || {
            let _ = tx.send(Instant::now());
        });

        let fired = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(30));
    }

    #[test]
    fn test_zero_delay_fires() {
        let (tx, rx) = mpsc::channel();
        let _handle = set_timer(Duration::ZERO, move || {
            let _ = tx.send(());
        });

        assert!(rx.recv_timeout(Duration::from_millis(500)).is_ok());
    }

    #[test]
    fn test_cancelled_timer_is_suppressed() {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = set_timer(Duration::from_millis(20), move || {
            let _ = tx.send(());
        });
        handle.cancel();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
