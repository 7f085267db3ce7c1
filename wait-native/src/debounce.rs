//! Collapse bursts of calls into a single trailing invocation
//!
//! A [`Debounce`] is either idle or holding one pending burst. Every call
//! replaces the burst's argument and pushes its deadline back. The burst
//! owns a single timer: when it fires before the deadline it re-arms for the
//! time that is left, and once the deadline has passed the wrapped function
//! runs with the latest argument and every caller in the burst receives the
//! result.

use {
    crate::{
        invocation::{Invocation, broadcast},
        platform::{self, TimerHandle},
    },
    futures_channel::oneshot,
    std::{
        fmt,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        time::{Duration, Instant},
    },
};

type Func<A, T> = Box<dyn Fn(A) -> T + Send + Sync>;

struct Burst<A, T> {
    arg: A,
    waiters: Vec<oneshot::Sender<T>>,
    /// End of the quiet period; later calls push it back
    deadline: Instant,
    timer: TimerHandle,
    generation: u64,
}

enum State<A, T> {
    Idle,
    Pending(Burst<A, T>),
}

struct Machine<A, T> {
    state: State<A, T>,
    /// Identifies the current burst; timers from earlier bursts are stale
    generation: u64,
    timers_armed: u64,
}

struct Shared<A, T> {
    wait: Duration,
    func: Func<A, T>,
    machine: Mutex<Machine<A, T>>,
}

impl<A, T> Shared<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, Machine<A, T>> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(self: &Arc<Self>, machine: &mut Machine<A, T>, delay: Duration, generation: u64) -> TimerHandle {
        machine.timers_armed += 1;
        let shared = Arc::downgrade(self);
        platform::set_timer(delay, move || {
            if let Some(shared) = shared.upgrade() {
                shared.fire(generation);
            }
        })
    }

    fn take_burst(&self) -> Option<Burst<A, T>> {
        match std::mem::replace(&mut self.lock().state, State::Idle) {
            State::Pending(burst) => Some(burst),
            State::Idle => None,
        }
    }

    fn fire(self: &Arc<Self>, generation: u64) {
        let mut machine = self.lock();
        let remaining = match &machine.state {
            State::Pending(burst) if burst.generation == generation => {
                burst.deadline.saturating_duration_since(Instant::now())
            }
            State::Pending(_) | State::Idle => return,
        };

        if !remaining.is_zero() {
            // Calls arrived after this timer was armed
            let timer = self.arm(&mut machine, remaining, generation);
            if let State::Pending(burst) = &mut machine.state {
                burst.timer = timer;
            }
            return;
        }

        let State::Pending(burst) = std::mem::replace(&mut machine.state, State::Idle) else {
            return;
        };
        drop(machine);
        self.run(burst);
    }

    fn run(&self, burst: Burst<A, T>) -> T {
        burst.timer.cancel();
        tracing::debug!(callers = burst.waiters.len(), "debounced call firing");
        let value = (self.func)(burst.arg);
        broadcast(burst.waiters, &value);
        value
    }
}

/// Debounced wrapper around `func`
pub struct Debounce<A, T> {
    shared: Arc<Shared<A, T>>,
}

impl<A, T> Debounce<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    /// Wrap `func` so it runs only once calls have stopped for `wait`
    pub fn new<F>(wait: Duration, func: F) -> Self
    where
        F: Fn(A) -> T + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                wait,
                func: Box::new(func),
                machine: Mutex::new(Machine {
                    state: State::Idle,
                    generation: 0,
                    timers_armed: 0,
                }),
            }),
        }
    }

    /// Schedule `func(arg)`, replacing any pending argument and restarting
    /// the quiet period. Resolves with the result of the burst's eventual run.
    pub fn call(&self, arg: A) -> Invocation<T> {
        let (sender, receiver) = oneshot::channel();
        let now = Instant::now();
        let deadline = now.checked_add(self.shared.wait).unwrap_or(now);

        let mut machine = self.shared.lock();
        if let State::Pending(burst) = &mut machine.state {
            burst.arg = arg;
            burst.waiters.push(sender);
            burst.deadline = deadline;
            return Invocation::waiting(receiver);
        }

        machine.generation += 1;
        let generation = machine.generation;
        let timer = self.shared.arm(&mut machine, self.shared.wait, generation);
        machine.state = State::Pending(Burst {
            arg,
            waiters: vec![sender],
            deadline,
            timer,
            generation,
        });

        Invocation::waiting(receiver)
    }

    /// Run the pending burst now instead of waiting for the timer.
    ///
    /// Returns the result, or `None` if nothing was pending.
    pub fn flush(&self) -> Option<T> {
        let burst = self.shared.take_burst()?;
        Some(self.shared.run(burst))
    }

    /// Drop the pending burst; its callers resolve with `None`.
    ///
    /// Returns whether anything was pending.
    pub fn cancel(&self) -> bool {
        let Some(burst) = self.shared.take_burst() else {
            return false;
        };
        burst.timer.cancel();
        tracing::debug!(callers = burst.waiters.len(), "debounced call cancelled");
        true
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.shared.lock().state, State::Pending(_))
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        self.shared.wait
    }

    #[cfg(test)]
    fn timers_armed(&self) -> u64 {
        self.shared.lock().timers_armed
    }
}

impl<A, T> Clone for Debounce<A, T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<A, T> fmt::Debug for Debounce<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounce").field("wait", &self.shared.wait).finish_non_exhaustive()
    }
}
