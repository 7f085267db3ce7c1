//! First future to finish, bounded by a deadline

use {
    futures_util::{StreamExt, future, stream::FuturesUnordered},
    std::{future::Future, time::Duration},
    wait_native::{TimedOut, with_timeout},
};

/// Resolve with the output of whichever future finishes first, success or
/// failure alike.
///
/// The losers are dropped once a winner is found. An empty input never
/// produces a winner and so waits out the full deadline.
///
/// # Errors
///
/// [`TimedOut`] if nothing finishes within `after`.
pub async fn race_with_timeout<I, Fut>(futures: I, after: Duration) -> Result<Fut::Output, TimedOut>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future,
{
    let mut racing: FuturesUnordered<Fut> = futures.into_iter().collect();
    let entrants = racing.len();

    let outcome = with_timeout(after, async move {
        match racing.next().await {
            Some(output) => output,
            None => future::pending().await,
        }
    })
    .await;

    if outcome.is_err() {
        tracing::debug!(entrants, ?after, "race timed out");
    }
    outcome
}
