//! Cooperative cancellation via an abort controller and its signal
//!
//! An [`AbortController`] owns the right to abort; any number of
//! [`AbortSignal`] clones observe it. Observers either poll
//! [`AbortSignal::is_aborted`], await [`AbortSignal::aborted`], or register a
//! one-shot listener with [`AbortSignal::on_abort`], which hands back a
//! [`ListenerGuard`] revocation token.
//!
//! Listeners run synchronously inside [`AbortController::abort_with`], in
//! registration order. Once [`ListenerGuard::revoke`] returns (or the guard is
//! dropped) the listener is guaranteed not to run.

use {
    futures_util::task::AtomicWaker,
    std::{
        borrow::Cow,
        collections::BTreeMap,
        fmt,
        future::Future,
        pin::Pin,
        sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
        task::{Context, Poll},
    },
};

/// Why a signal was aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReason(Cow<'static, str>);

impl AbortReason {
    /// Reason used when the controller aborts without one
    pub const DEFAULT: Self = Self(Cow::Borrowed("aborted"));

    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self(reason.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AbortReason {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for AbortReason {
    fn from(reason: &'static str) -> Self {
        Self::new(reason)
    }
}

impl From<String> for AbortReason {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

type Listener = Box<dyn FnOnce(&AbortReason) + Send>;

/// A registered listener; the mutex is held while the listener runs so that
/// revocation waits for an in-progress invocation
type ListenerSlot = Arc<Mutex<Option<Listener>>>;

#[derive(Default)]
struct SignalState {
    reason: Option<AbortReason>,
    listeners: BTreeMap<u64, ListenerSlot>,
    next_id: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SignalState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The aborting side of a cancellation pair
#[derive(Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal observing this controller
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort with the default reason
    pub fn abort(&self) {
        self.abort_with(AbortReason::DEFAULT);
    }

    /// Abort with `reason`. Only the first abort has any effect.
    pub fn abort_with(&self, reason: impl Into<AbortReason>) {
        let reason = reason.into();
        let listeners = {
            let mut state = self.signal.shared.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            std::mem::take(&mut state.listeners)
        };

        tracing::debug!(%reason, listeners = listeners.len(), "abort signalled");

        for slot in listeners.into_values() {
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(listener) = slot.take() {
                listener(&reason);
            }
        }
    }
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController").field("signal", &self.signal).finish()
    }
}

/// The observing side of a cancellation pair
#[derive(Clone, Default)]
pub struct AbortSignal {
    shared: Arc<Shared>,
}

impl AbortSignal {
    /// Whether the controller has aborted
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.lock().reason.is_some()
    }

    /// The abort reason, once aborted
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        self.shared.lock().reason.clone()
    }

    /// Register a one-shot listener.
    ///
    /// If the signal has already been aborted the listener runs immediately,
    /// before this returns, and the returned guard is inert.
    pub fn on_abort<F>(&self, listener: F) -> ListenerGuard
    where
        F: FnOnce(&AbortReason) + Send + 'static,
    {
        let mut state = self.shared.lock();
        if let Some(reason) = state.reason.clone() {
            drop(state);
            listener(&reason);
            return ListenerGuard { registration: None };
        }

        let id = state.next_id;
        state.next_id += 1;
        let slot: ListenerSlot = Arc::new(Mutex::new(Some(Box::new(listener))));
        state.listeners.insert(id, slot.clone());

        ListenerGuard {
            registration: Some(Registration {
                shared: Arc::downgrade(&self.shared),
                id,
                slot,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    /// A future completing with the reason once the signal is aborted
    #[must_use]
    pub fn aborted(&self) -> Aborted {
        Aborted {
            signal: self.clone(),
            waker: Arc::new(AtomicWaker::new()),
            listener: None,
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal").field("reason", &self.reason()).finish()
    }
}

struct Registration {
    shared: Weak<Shared>,
    id: u64,
    slot: ListenerSlot,
}

/// Revocation token for a listener registered with [`AbortSignal::on_abort`].
///
/// Dropping the guard revokes the listener.
#[must_use = "dropping the guard revokes the listener"]
pub struct ListenerGuard {
    registration: Option<Registration>,
}

impl ListenerGuard {
    /// Revoke the listener. Waits for the listener to finish if an abort is
    /// invoking it on another thread right now; idempotent.
    pub fn revoke(&mut self) {
        let Some(registration) = self.registration.take() else {
            return;
        };

        if let Some(shared) = registration.shared.upgrade() {
            shared.lock().listeners.remove(&registration.id);
        }
        registration.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Whether the guard still holds a listener that has not run
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.registration
            .as_ref()
            .is_some_and(|registration| registration.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.revoke();
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard").field("armed", &self.is_armed()).finish()
    }
}

/// Future returned by [`AbortSignal::aborted`]
#[derive(Debug)]
pub struct Aborted {
    signal: AbortSignal,
    waker: Arc<AtomicWaker>,
    listener: Option<ListenerGuard>,
}

impl Future for Aborted {
    type Output = AbortReason;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(reason) = this.signal.reason() {
            return Poll::Ready(reason);
        }

        this.waker.register(cx.waker());
        if this.listener.is_none() {
            let waker = this.waker.clone();
            this.listener = Some(this.signal.on_abort(move |_| waker.wake()));
        }

        // An abort may have landed between the first check and registration
        match this.signal.reason() {
            Some(reason) => Poll::Ready(reason),
            None => Poll::Pending,
        }
    }
}
