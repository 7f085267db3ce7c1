//! A future paired with a handle that settles it from anywhere
//!
//! Reject by resolving a `Promise<Result<T, E>>` with `Err`.

use {
    futures_channel::oneshot,
    std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PromiseError {
    #[error("resolver dropped without settling the promise")]
    ResolverDropped,
}

/// Settles the paired [`Promise`]; consumed on use, so it settles at most once
#[derive(Debug)]
pub struct Resolver<T> {
    sender: oneshot::Sender<T>,
}

impl<T> Resolver<T> {
    /// Settle the promise with `value`.
    ///
    /// Hands the value back if the promise was already dropped.
    pub fn resolve(self, value: T) -> Result<(), T> {
        self.sender.send(value)
    }

    /// Whether the promise has been dropped, making resolution pointless
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_canceled()
    }
}

/// Resolves with the value passed to the paired [`Resolver`]
#[derive(Debug)]
#[must_use = "a promise does nothing unless awaited"]
pub struct Promise<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for Promise<T> {
    type Output = Result<T, PromiseError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|result| result.map_err(|oneshot::Canceled| PromiseError::ResolverDropped))
    }
}

/// Create a linked resolver and promise
pub fn create_promise<T>() -> (Resolver<T>, Promise<T>) {
    let (sender, receiver) = oneshot::channel();
    (Resolver { sender }, Promise { receiver })
}
