//! Result handle shared by [`Debounce`](crate::Debounce) and
//! [`Throttle`](crate::Throttle)

use {
    futures_channel::oneshot,
    std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    },
};

/// A future resolving with the result of the call it was coalesced into.
///
/// Resolves to `None` when the pending call was cancelled or its owner was
/// dropped before it ran.
#[derive(Debug)]
#[must_use = "an invocation does nothing unless awaited"]
pub struct Invocation<T> {
    state: InvocationState<T>,
}

#[derive(Debug)]
enum InvocationState<T> {
    Done(Option<T>),
    Waiting(oneshot::Receiver<T>),
}

impl<T> Invocation<T> {
    pub(crate) fn ready(value: T) -> Self {
        Self {
            state: InvocationState::Done(Some(value)),
        }
    }

    pub(crate) fn waiting(receiver: oneshot::Receiver<T>) -> Self {
        Self {
            state: InvocationState::Waiting(receiver),
        }
    }
}

// The value is only ever moved out, never pinned
impl<T> Unpin for Invocation<T> {}

impl<T> Future for Invocation<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            InvocationState::Done(value) => Poll::Ready(value.take()),
            InvocationState::Waiting(receiver) => Pin::new(receiver).poll(cx).map(Result::ok),
        }
    }
}

/// Deliver `value` to every waiter still listening
pub(crate) fn broadcast<T: Clone>(waiters: Vec<oneshot::Sender<T>>, value: &T) {
    for waiter in waiters {
        let _ = waiter.send(value.clone());
    }
}
