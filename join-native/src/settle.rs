//! Await every future regardless of failures

use {
    futures_util::future::join_all,
    std::future::Future,
};

/// Drive all futures concurrently and collect every outcome in input order.
///
/// Unlike [`parallel`](crate::parallel), one failure does not stop the rest.
pub async fn all_settled<I, Fut, T, E>(futures: I) -> Vec<Result<T, E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let outcomes = join_all(futures).await;
    tracing::trace!(
        settled = outcomes.len(),
        failed = outcomes.iter().filter(|outcome| outcome.is_err()).count(),
        "all futures settled"
    );
    outcomes
}

/// Split settled outcomes into successes and failures, each in input order
pub fn partition_settled<T, E>(outcomes: Vec<Result<T, E>>) -> (Vec<T>, Vec<E>) {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(value) => values.push(value),
            Err(error) => errors.push(error),
        }
    }
    (values, errors)
}
