//! Timeout functionality using platform-native timers

use {
    crate::sleep::Sleep,
    pin_project::pin_project,
    std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    },
};

/// The wrapped future did not complete before its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {after:?}")]
pub struct TimedOut {
    /// The timeout that elapsed
    pub after: Duration,
}

/// A future that wraps another future with a timeout
#[pin_project]
#[derive(Debug)]
pub struct Timeout<F> {
    #[pin]
    future: F,
    sleep: Sleep,
    after: Duration,
    completed: bool,
}

impl<F> Timeout<F> {
    fn new(future: F, after: Duration) -> Self {
        Self {
            future,
            sleep: Sleep::new(after),
            after,
            completed: false,
        }
    }

    /// Consume the timeout, returning the wrapped future
    pub fn into_inner(self) -> F {
        self.future
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output, TimedOut>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let timed_out = TimedOut { after: *this.after };

        if *this.completed {
            return Poll::Ready(Err(timed_out));
        }

        // The wrapped future gets the first chance, even with a zero timeout
        if let Poll::Ready(output) = this.future.poll(cx) {
            *this.completed = true;
            this.sleep.cancel();
            return Poll::Ready(Ok(output));
        }

        if Pin::new(&mut *this.sleep).poll(cx).is_ready() {
            *this.completed = true;
            tracing::debug!(after = ?this.after, "timeout elapsed");
            return Poll::Ready(Err(timed_out));
        }

        Poll::Pending
    }
}

/// Wraps a future with a timeout
pub fn with_timeout<F>(after: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout::new(future, after)
}
