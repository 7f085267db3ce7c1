use {
    libc::c_void,
    std::{
        thread,
        time::{Duration, Instant},
    },
};

/// One-shot `CLOCK_MONOTONIC` timerfd, closed on drop
struct TimerFd(i32);

impl TimerFd {
    fn create() -> Option<Self> {
        let fd = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC) };
        (fd != -1).then_some(Self(fd))
    }

    fn arm(&self, delay: Duration) -> bool {
        let spec = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: libc::timespec {
                tv_sec: delay.as_secs() as libc::time_t,
                tv_nsec: delay.subsec_nanos() as libc::c_long,
            },
        };

        unsafe { libc::timerfd_settime(self.0, 0, &spec, std::ptr::null_mut()) != -1 }
    }

    /// Blocks until the timer expires; false if the read was interrupted
    fn expire(&self) -> bool {
        let mut expirations = [0u8; 8];
        let read = unsafe { libc::read(self.0, expirations.as_mut_ptr().cast::<c_void>(), expirations.len()) };
        read == 8
    }
}

impl Drop for TimerFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

fn wait(delay: Duration) {
    let deadline = Instant::now() + delay;

    // An all-zero it_value disarms a timerfd, so zero delays never reach it
    if let Some(timer) = TimerFd::create().filter(|_| !delay.is_zero())
        && timer.arm(delay)
        && timer.expire()
    {
        return;
    }

    thread::sleep(deadline.saturating_duration_since(Instant::now()));
}

pub(super) fn arm<F>(delay: Duration, fire: F)
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        wait(delay);
        fire();
    });
}
