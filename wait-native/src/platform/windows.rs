use {
    std::{thread, time::Duration},
    windows::Win32::{
        Foundation::{CloseHandle, WAIT_OBJECT_0},
        System::Threading::{CreateWaitableTimerW, INFINITE, SetWaitableTimer, WaitForSingleObject},
    },
};

/// Waits on a one-shot waitable timer, false if the timer could not be used
fn wait_on_waitable_timer(delay: Duration) -> bool {
    // Relative due times are negative, in 100ns units
    let due_time = -((delay.as_nanos() / 100) as i64);

    unsafe {
        let Ok(timer) = CreateWaitableTimerW(None, true, None) else {
            return false;
        };

        let armed = SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok();
        let expired = armed && WaitForSingleObject(timer, INFINITE) == WAIT_OBJECT_0;
        let _ = CloseHandle(timer);
        expired
    }
}

pub(super) fn arm<F>(delay: Duration, fire: F)
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        if !wait_on_waitable_timer(delay) {
            thread::sleep(delay);
        }
        fire();
    });
}
