use std::{thread, time::Duration};

pub(super) fn arm<F>(delay: Duration, fire: F)
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        thread::sleep(delay);
        fire();
    });
}
