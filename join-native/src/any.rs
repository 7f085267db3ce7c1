//! First success among several futures

use {
    futures_util::{FutureExt, StreamExt, stream::FuturesUnordered},
    std::future::Future,
};

/// Every future failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("all {} futures failed", .errors.len())]
pub struct AggregateError<E> {
    /// One error per input future, in input order
    pub errors: Vec<E>,
}

/// Resolve with the first future to succeed.
///
/// Failures are collected while the others keep running; the remaining
/// futures are dropped as soon as one succeeds.
///
/// # Errors
///
/// [`AggregateError`] once every future has failed. An empty input fails
/// immediately with no errors.
pub async fn any<I, Fut, T, E>(futures: I) -> Result<T, AggregateError<E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let mut racing: FuturesUnordered<_> = futures
        .into_iter()
        .enumerate()
        .map(|(index, future)| future.map(move |outcome| (index, outcome)))
        .collect();
    let mut errors: Vec<Option<E>> = std::iter::repeat_with(|| None).take(racing.len()).collect();

    while let Some((index, outcome)) = racing.next().await {
        match outcome {
            Ok(value) => {
                tracing::trace!(index, dropped = racing.len(), "first success");
                return Ok(value);
            }
            Err(error) => errors[index] = Some(error),
        }
    }

    tracing::debug!(failed = errors.len(), "every future failed");
    Err(AggregateError {
        errors: errors.into_iter().flatten().collect(),
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::parallel::tests::{Probe, failing, task},
        std::sync::Arc,
    };

    #[test]
    fn test_first_success_wins_over_earlier_failure() {
        let probe = Arc::new(Probe::default());
        let futures = vec![failing(&probe, "fast failure", 1)(), task(&probe, 2, 40)(), task(&probe, 3, 10)()];

        assert_eq!(blockon::block_on(any(futures)), Ok(3));
    }

    #[test]
    fn test_all_failures_are_collected_in_input_order() {
        let probe = Arc::new(Probe::default());
        let futures = vec![failing(&probe, "a", 20)(), failing(&probe, "b", 1)(), failing(&probe, "c", 10)()];

        let error = blockon::block_on(any(futures)).unwrap_err();

        assert_eq!(error.errors, vec!["a", "b", "c"]);
        assert_eq!(error.to_string(), "all 3 futures failed");
    }

    #[test]
    fn test_empty_input_fails() {
        let futures: Vec<std::future::Ready<Result<u8, &str>>> = Vec::new();
        assert_eq!(blockon::block_on(any(futures)), Err(AggregateError { errors: Vec::new() }));
    }
}
