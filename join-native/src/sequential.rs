//! Run task thunks one after another

use std::future::Future;

/// Run each task to completion before invoking the next.
///
/// Returns the results in order, or the first error. Tasks after a failing
/// one are never invoked.
pub async fn sequential<I, F, Fut, T, E>(tasks: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let tasks = tasks.into_iter();
    let mut results = Vec::with_capacity(tasks.size_hint().0);

    for (index, task) in tasks.enumerate() {
        tracing::trace!(index, "starting task");
        match task().await {
            Ok(value) => results.push(value),
            Err(error) => {
                tracing::debug!(index, "task failed, skipping the rest");
                return Err(error);
            }
        }
    }

    Ok(results)
}
