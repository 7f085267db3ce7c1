//! Limit a function to one run per window, with a trailing run for calls
//! made while cooling down

use {
    crate::{
        invocation::{Invocation, broadcast},
        platform::{self, TimerHandle},
    },
    futures_channel::oneshot,
    std::{
        fmt,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        time::Duration,
    },
};

type Func<A, T> = Box<dyn Fn(A) -> T + Send + Sync>;

struct Trailing<A, T> {
    arg: A,
    waiters: Vec<oneshot::Sender<T>>,
}

enum State<A, T> {
    Idle,
    Cooling {
        trailing: Option<Trailing<A, T>>,
        timer: TimerHandle,
        generation: u64,
    },
}

struct Machine<A, T> {
    state: State<A, T>,
    generation: u64,
}

struct Shared<A, T> {
    window: Duration,
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

    /// Open a new window; must be called with the machine locked
    fn cool_down(self: &Arc<Self>, machine: &mut Machine<A, T>) {
        machine.generation += 1;
        let generation = machine.generation;

        let shared = Arc::downgrade(self);
        let timer = platform::set_timer(self.window, move || {
            if let Some(shared) = shared.upgrade() {
                shared.window_closed(generation);
            }
        });

        machine.state = State::Cooling {
            trailing: None,
            timer,
            generation,
        };
    }

    fn window_closed(self: &Arc<Self>, generation: u64) {
        let trailing = {
            let mut machine = self.lock();
            let State::Cooling {
                trailing,
                generation: current,
                ..
            } = &mut machine.state
            else {
                return;
            };
            if *current != generation {
                return;
            }

            let trailing = trailing.take();
            if trailing.is_some() {
                // The trailing run counts as a call, so it opens a fresh window
                self.cool_down(&mut machine);
            } else {
                machine.state = State::Idle;
            }
            trailing
        };

        if let Some(Trailing { arg, waiters }) = trailing {
            tracing::debug!(callers = waiters.len(), "throttled trailing call firing");
            let value = (self.func)(arg);
            broadcast(waiters, &value);
        }
    }
}

/// Throttled wrapper around `func`
pub struct Throttle<A, T> {
    shared: Arc<Shared<A, T>>,
}

impl<A, T> Throttle<A, T>
where
    A: Send + 'static,
    T: Clone + Send + 'static,
{
    /// Wrap `func` so it runs at most once per `window`
    pub fn new<F>(window: Duration, func: F) -> Self
    where
        F: Fn(A) -> T + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                window,
                func: Box::new(func),
                machine: Mutex::new(Machine {
                    state: State::Idle,
                    generation: 0,
                }),
            }),
        }
    }

    /// Call the throttled function.
    ///
    /// Outside a window `func(arg)` runs right away, on the calling thread,
    /// and the returned invocation is already resolved. Inside a window the
    /// call joins the trailing run, which uses the latest argument and fires
    /// when the window closes.
    pub fn call(&self, arg: A) -> Invocation<T> {
        let mut machine = self.shared.lock();

        match &mut machine.state {
            State::Idle => {
                self.shared.cool_down(&mut machine);
                drop(machine);
                Invocation::ready((self.shared.func)(arg))
            }
            State::Cooling { trailing, .. } => {
                let (sender, receiver) = oneshot::channel();
                match trailing {
                    Some(trailing) => {
                        trailing.arg = arg;
                        trailing.waiters.push(sender);
                    }
                    None => {
                        *trailing = Some(Trailing {
                            arg,
                            waiters: vec![sender],
                        });
                    }
                }
                Invocation::waiting(receiver)
            }
        }
    }

    /// Drop the trailing run and end the current window; waiting callers
    /// resolve with `None`.
    ///
    /// Returns whether a window was open.
    pub fn cancel(&self) -> bool {
        let mut machine = self.shared.lock();
        match std::mem::replace(&mut machine.state, State::Idle) {
            State::Cooling { trailing, timer, .. } => {
                timer.cancel();
                tracing::debug!(dropped = trailing.is_some(), "throttle cancelled");
                true
            }
            State::Idle => false,
        }
    }

    /// Whether a window is currently open
    #[must_use]
    pub fn is_cooling(&self) -> bool {
        matches!(self.shared.lock().state, State::Cooling { .. })
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.shared.window
    }
}

impl<A, T> Clone for Throttle<A, T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<A, T> fmt::Debug for Throttle<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle").field("window", &self.shared.window).finish_non_exhaustive()
    }
}
