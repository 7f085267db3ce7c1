use {
    dispatch2::{DispatchQueue, DispatchQueueGlobalPriority, DispatchTime, GlobalQueueIdentifier},
    std::{thread, time::Duration},
};

pub(super) fn arm<F>(delay: Duration, fire: F)
where
    F: FnOnce() + Send + 'static,
{
    let queue = DispatchQueue::global_queue(GlobalQueueIdentifier::Priority(DispatchQueueGlobalPriority::Default));

    let Ok(offset) = DispatchTime::try_from(delay) else {
        // Delay does not fit a dispatch time; park a plain thread instead
        thread::spawn(move || {
            thread::sleep(delay);
            fire();
        });
        return;
    };
    let when = DispatchTime(DispatchTime::NOW.0 + offset.0);

    if queue.after(when, fire).is_err() {
        tracing::warn!(?delay, "dispatch queue rejected timer");
    }
}
