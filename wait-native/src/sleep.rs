//! Deadline-based sleeps backed by the platform timer

use {
    crate::platform,
    std::{
        future::Future,
        pin::Pin,
        sync::{Arc, Mutex, PoisonError},
        task::{Context, Poll, Waker},
        time::{Duration, Instant},
    },
};

/// Roughly 30 years, used when `now + duration` overflows `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A future that resolves once its deadline has been reached
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    timer: Arc<Mutex<TimerState>>,
    handle: Option<platform::TimerHandle>,
}

#[derive(Debug)]
enum TimerState {
    Pending { waker: Option<Waker> },
    Elapsed,
    Cancelled,
}

impl Sleep {
    /// Create a sleep future that completes after the given duration
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE);
        Self::until(deadline)
    }

    /// Create a sleep future that completes at `deadline`.
    ///
    /// A deadline that has already passed yields a future that is ready on
    /// its first poll; no timer is armed for it.
    #[must_use]
    pub fn until(deadline: Instant) -> Self {
        let delay = deadline.saturating_duration_since(Instant::now());
        if delay.is_zero() {
            return Self {
                deadline,
                timer: Arc::new(Mutex::new(TimerState::Elapsed)),
                handle: None,
            };
        }

        let timer = Arc::new(Mutex::new(TimerState::Pending { waker: None }));
        let timer_clone = timer.clone();

        let handle = platform::set_timer(delay, move || {
            let mut state = timer_clone.lock().unwrap_or_else(PoisonError::into_inner);
            let TimerState::Pending { waker } = std::mem::replace(&mut *state, TimerState::Elapsed) else {
                // already cancelled
                return;
            };
            drop(state);

            if let Some(waker) = waker {
                waker.wake();
            }
        });

        Self {
            deadline,
            timer,
            handle: Some(handle),
        }
    }

    /// The instant this sleep completes at
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the sleep has completed, either by elapsing or being cancelled
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        let state = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*state, TimerState::Pending { .. })
    }

    /// Cancel the timer, completing the sleep immediately
    pub fn cancel(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.cancel();

        let mut state = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let TimerState::Pending { waker } = std::mem::replace(&mut *state, TimerState::Cancelled) {
            drop(state);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.timer.lock().unwrap_or_else(PoisonError::into_inner);

        match &mut *state {
            TimerState::Cancelled | TimerState::Elapsed => Poll::Ready(()),
            TimerState::Pending { waker } => {
                match waker {
                    // The sleep may have moved to another task since the last poll
                    Some(waker) if !waker.will_wake(cx.waker()) => waker.clone_from(cx.waker()),
                    Some(_) => {}
                    None => *waker = Some(cx.waker().clone()),
                }

                Poll::Pending
            }
        }
    }
}

/// Complete once `duration` has passed
#[must_use]
pub fn sleep_for(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

/// Sleep until the given instant; completes immediately if it has passed
#[must_use]
pub fn sleep_at(deadline: Instant) -> Sleep {
    Sleep::until(deadline)
}
