//! Drive a single future to completion on the current thread
//!
//! The calling thread parks on a condition variable between polls and is
//! unparked by the future's waker, which may be invoked from any thread
//! (platform timer threads included).

use std::{
    future::Future,
    pin::pin,
    sync::{Arc, Condvar, Mutex, PoisonError},
    task::{Context, Poll, Wake, Waker},
};

struct Parker {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Parker {
    fn new() -> Self {
        Self {
            notified: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut notified = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        while !*notified {
            notified = self.condvar.wait(notified).unwrap_or_else(PoisonError::into_inner);
        }
        *notified = false;
    }

    fn unpark(&self) {
        let mut notified = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        *notified = true;
        self.condvar.notify_one();
    }
}

impl Wake for Parker {
    fn wake(self: Arc<Self>) {
        self.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.unpark();
    }
}

/// Block the current thread until `fut` completes and return its output
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let parker = Arc::new(Parker::new());
    let waker = Waker::from(parker.clone());
    let mut cx = Context::from_waker(&waker);

    let mut fut = pin!(fut);

    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(output) => break output,
            Poll::Pending => parker.park(),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            thread,
            time::{Duration, Instant},
        },
    };

    /// Pending once, then woken from another thread after `delay`
    struct WakeFromThread {
        delay: Duration,
        spawned: bool,
    }

    impl Future for WakeFromThread {
        type Output = &'static str;

        fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            if self.spawned {
                return Poll::Ready("woken");
            }
            self.spawned = true;
            let waker = cx.waker().clone();
            let delay = self.delay;
            thread::spawn(move || {
                thread::sleep(delay);
                waker.wake();
            });
            Poll::Pending
        }
    }

    #[test]
    fn test_ready_future() {
        assert_eq!(block_on(async { 7 }), 7);
    }

    #[test]
    fn test_woken_from_other_thread() {
        let start = Instant::now();
        let out = block_on(WakeFromThread {
            delay: Duration::from_millis(20),
            spawned: false,
        });
        assert_eq!(out, "woken");
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wake_before_park_is_not_lost() {
        let out = block_on(WakeFromThread {
            delay: Duration::ZERO,
            spawned: false,
        });
        assert_eq!(out, "woken");
    }
}
