//! Runtime-agnostic waiting primitives on platform-native timers
//!
//! Sleep, timeout, condition polling, retry, debounce and throttle, usable
//! from any async runtime (Tokio, async-std, smol, a bare `block_on`). Timers
//! fire from platform timer threads and wake the waiting task; nothing here
//! depends on a runtime-specific reactor.

// Platform-specific timer implementations
mod platform;

mod invocation;

pub mod debounce;
pub mod retry;
pub mod signal;
pub mod sleep;
pub mod throttle;
pub mod timeout;
pub mod until;

pub use {
    debounce::Debounce,
    invocation::Invocation,
    retry::{RetryError, RetryPolicy, exponential_backoff, retry, retry_when},
    signal::{AbortController, AbortReason, AbortSignal, Aborted, ListenerGuard},
    sleep::{Sleep, sleep_at, sleep_for},
    throttle::Throttle,
    timeout::{TimedOut, Timeout, with_timeout},
    until::{Backoff, Readiness, WaitError, WaitOptions, sleep_until},
};
