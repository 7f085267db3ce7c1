//! Poll a condition until it yields a value, a timeout passes, or the wait is
//! aborted
//!
//! ```text
//! INIT ──aborted──────────────────────────────▶ CANCELLED
//!  │
//!  ▼
//! POLLING ──abort (top of cycle or listener)──▶ CANCELLED
//!  │  ├──condition returned Err──────────────▶ FAILED
//!  │  ├──condition returned a value──────────▶ RESOLVED
//!  │  └──elapsed >= timeout──────────────────▶ TIMED_OUT
//!  └──sleep(backoff(attempt) or interval), attempt += 1
//! ```
//!
//! Exactly one terminal outcome is committed per call. The abort listener
//! and the polling loop race to commit through a shared gate; the loser
//! observes the committed state and yields it instead of its own.

use {
    crate::{
        signal::{AbortReason, AbortSignal},
        sleep::sleep_for,
    },
    futures_util::task::AtomicWaker,
    pin_project::pin_project,
    std::{
        fmt,
        future::Future,
        pin::Pin,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        task::{Context, Poll},
        time::{Duration, Instant},
    },
};

/// Spacing between condition checks when no backoff is configured
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Computes the wait before the next check from the zero-based attempt index
pub type Backoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Configuration for [`sleep_until`]
#[derive(Clone)]
pub struct WaitOptions {
    /// Wait between checks; ignored when `backoff` is set
    pub interval: Duration,
    /// Fail with [`WaitError::TimeoutExceeded`] once this much time has passed
    pub timeout: Option<Duration>,
    /// Abort the wait early
    pub signal: Option<AbortSignal>,
    pub backoff: Option<Backoff>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: None,
            signal: None,
            backoff: None,
        }
    }
}

impl WaitOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    #[must_use]
    pub fn backoff<F>(mut self, backoff: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }
}

impl fmt::Debug for WaitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitOptions")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("signal", &self.signal)
            .field("backoff", &self.backoff.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// What a condition check returns: either "not yet" or a value
pub trait Readiness {
    type Output;

    /// `None` means "not yet, check again"
    fn into_ready(self) -> Option<Self::Output>;
}

/// `false` is "not yet"; `true` resolves the wait with `true`
impl Readiness for bool {
    type Output = bool;

    fn into_ready(self) -> Option<bool> {
        self.then_some(true)
    }
}

/// `None` is "not yet"; any `Some`, including `Some(0)` or `Some("")`, resolves
impl<T> Readiness for Option<T> {
    type Output = T;

    fn into_ready(self) -> Option<T> {
        self
    }
}

/// Why [`sleep_until`] failed
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum WaitError<E> {
    #[error("condition not met within {timeout:?}")]
    TimeoutExceeded { timeout: Duration },
    #[error("wait cancelled: {0}")]
    Cancelled(AbortReason),
    /// The condition itself failed; the error is passed through untouched
    #[error("condition check failed: {0}")]
    OperationFailed(E),
}

impl<E> WaitError<E> {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutExceeded { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// The condition's own error, if that is why the wait failed
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Commit {
    Open,
    Settled,
    Cancelled(AbortReason),
}

/// Single-commit guard shared between the polling loop and the abort listener
#[derive(Debug)]
struct Gate {
    commit: Mutex<Commit>,
    waker: AtomicWaker,
}

impl Gate {
    fn new() -> Self {
        Self {
            commit: Mutex::new(Commit::Open),
            waker: AtomicWaker::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Commit> {
        self.commit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listener path: commit the cancellation unless something else already has
    fn cancel(&self, reason: &AbortReason) {
        let mut commit = self.lock();
        if matches!(*commit, Commit::Open) {
            *commit = Commit::Cancelled(reason.clone());
            drop(commit);
            self.waker.wake();
        }
    }

    fn cancelled(&self) -> Option<AbortReason> {
        match &*self.lock() {
            Commit::Cancelled(reason) => Some(reason.clone()),
            Commit::Open | Commit::Settled => None,
        }
    }

    /// Loop path: commit `outcome`, unless the listener won the race
    fn settle<T, E>(&self, outcome: Result<T, WaitError<E>>) -> Result<T, WaitError<E>> {
        let mut commit = self.lock();
        match &*commit {
            Commit::Cancelled(reason) => Err(WaitError::Cancelled(reason.clone())),
            Commit::Open | Commit::Settled => {
                *commit = Commit::Settled;
                outcome
            }
        }
    }
}

/// Polls `future` until it completes or the gate commits a cancellation
#[pin_project]
struct Guarded<'a, F> {
    gate: &'a Gate,
    #[pin]
    future: F,
}

impl<'a, F> Guarded<'a, F> {
    fn new(gate: &'a Gate, future: F) -> Self {
        Self { gate, future }
    }
}

impl<F: Future> Future for Guarded<'_, F> {
    type Output = Result<F::Output, AbortReason>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        this.gate.waker.register(cx.waker());
        if let Some(reason) = this.gate.cancelled() {
            return Poll::Ready(Err(reason));
        }

        this.future.poll(cx).map(Ok)
    }
}

/// Wait until `condition` yields a value.
///
/// `condition` is invoked once per cycle and never concurrently with itself.
/// Between unsuccessful checks the wait sleeps for `backoff(attempt)` when a
/// backoff is configured, otherwise for `interval`, but never past the
/// timeout; a zero wait re-checks immediately.
///
/// # Errors
///
/// - [`WaitError::Cancelled`] if the signal is aborted before or during the
///   wait. An already-aborted signal fails without invoking `condition`.
/// - [`WaitError::TimeoutExceeded`] if a check comes back empty after the
///   timeout has elapsed.
/// - [`WaitError::OperationFailed`] with the condition's own error; no
///   further checks are made.
pub async fn sleep_until<C, Fut, R, E>(mut condition: C, options: WaitOptions) -> Result<R::Output, WaitError<E>>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    R: Readiness,
{
    let WaitOptions {
        interval,
        timeout,
        signal,
        backoff,
    } = options;
    let started = Instant::now();

    if let Some(reason) = signal.as_ref().and_then(AbortSignal::reason) {
        tracing::debug!(%reason, "wait aborted before first check");
        return Err(WaitError::Cancelled(reason));
    }

    let gate = Arc::new(Gate::new());
    let _listener = signal.as_ref().map(|signal| {
        let gate = gate.clone();
        signal.on_abort(move |reason| gate.cancel(reason))
    });

    let mut attempt: u32 = 0;
    loop {
        if let Some(reason) = gate.cancelled() {
            tracing::debug!(%reason, attempt, "wait cancelled");
            return Err(WaitError::Cancelled(reason));
        }

        tracing::trace!(attempt, "checking condition");
        let checked = match Guarded::new(&gate, condition()).await {
            Ok(checked) => checked,
            Err(reason) => {
                tracing::debug!(%reason, attempt, "wait cancelled during check");
                return Err(WaitError::Cancelled(reason));
            }
        };

        match checked {
            Err(error) => {
                tracing::debug!(attempt, "condition check failed");
                return gate.settle(Err(WaitError::OperationFailed(error)));
            }
            Ok(ready) => {
                if let Some(value) = ready.into_ready() {
                    tracing::debug!(attempt, elapsed = ?started.elapsed(), "condition met");
                    return gate.settle(Ok(value));
                }
            }
        }

        if let Some(timeout) = timeout
            && started.elapsed() >= timeout
        {
            tracing::debug!(attempt, ?timeout, "wait timed out");
            return gate.settle(Err(WaitError::TimeoutExceeded { timeout }));
        }

        let mut delay = backoff.as_ref().map_or(interval, |backoff| backoff(attempt));
        if let Some(timeout) = timeout {
            // Wake for one last check at the deadline rather than oversleeping it
            delay = delay.min(timeout.saturating_sub(started.elapsed()));
        }
        if !delay.is_zero()
            && let Err(reason) = Guarded::new(&gate, sleep_for(delay)).await
        {
            tracing::debug!(%reason, attempt, "wait cancelled during backoff");
            return Err(WaitError::Cancelled(reason));
        }

        attempt = attempt.saturating_add(1);
    }
}
