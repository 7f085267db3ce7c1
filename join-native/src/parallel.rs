//! Run task thunks with bounded concurrency
//!
//! Tasks are started in submission order and each result lands in the slot
//! of the task that produced it, whatever order they complete in. With a
//! limit of `k`, at most `k` tasks are in flight; a new one starts only when
//! a running one completes.
//!
//! On the first failure no further tasks are started. What happens to the
//! tasks already in flight depends on the entry point: [`parallel`] drops
//! them along with itself, while [`parallel_detached`] hands them to a
//! spawner so they still run to completion, their results discarded.

use {
    futures_util::{
        StreamExt, TryFutureExt,
        future::{self, try_join_all},
        stream::FuturesUnordered,
        task::{Spawn, SpawnExt},
    },
    pin_project::pin_project,
    std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    },
};

/// How many tasks [`parallel`] may run at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// At most this many; zero is rejected
    Limited(usize),
    /// Everything at once
    #[default]
    Unbounded,
}

impl From<usize> for Concurrency {
    fn from(limit: usize) -> Self {
        Self::Limited(limit)
    }
}

impl From<Option<usize>> for Concurrency {
    fn from(limit: Option<usize>) -> Self {
        limit.map_or(Self::Unbounded, Self::Limited)
    }
}

/// Why [`parallel`] failed
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParallelError<E> {
    #[error("concurrency limit must be positive, got {limit}")]
    InvalidConfiguration { limit: usize },
    /// The first task failure observed; later failures are not reported
    #[error("task {index} failed: {error}")]
    TaskFailed { index: usize, error: E },
}

impl<E> ParallelError<E> {
    /// The failing task's error, if a task failed
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::TaskFailed { error, .. } => Some(error),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Run every task, at most `limit` at a time.
///
/// Returns the results in submission order once all tasks have succeeded.
/// On the first failure no further tasks are started and the tasks still in
/// flight are dropped with the returned future, which cancels them. Use
/// [`parallel_detached`] to let them finish instead.
///
/// # Errors
///
/// - [`ParallelError::InvalidConfiguration`] for a limit of zero, before any
///   task is invoked.
/// - [`ParallelError::TaskFailed`] with the first error a task returns.
pub async fn parallel<I, F, Fut, T, E>(tasks: I, limit: impl Into<Concurrency>) -> Result<Vec<T>, ParallelError<E>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let limit = limit.into();
    let tasks = collect_tasks::<_, _, E>(tasks, limit)?;
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    match limit {
        Concurrency::Limited(limit) if limit < tasks.len() => windowed(tasks, limit).await.map_err(|failure| failure.error),
        Concurrency::Limited(_) | Concurrency::Unbounded => all_at_once(tasks).await,
    }
}

/// Like [`parallel`], but tasks still in flight when one fails are handed to
/// `spawner` and run to completion in the background.
///
/// Their results are discarded. Tasks that had not started yet are never
/// invoked. If the spawner refuses the work, the in-flight tasks are dropped.
///
/// # Errors
///
/// Same as [`parallel`].
pub async fn parallel_detached<I, F, Fut, T, E, S>(
    tasks: I,
    limit: impl Into<Concurrency>,
    spawner: &S,
) -> Result<Vec<T>, ParallelError<E>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    S: Spawn + ?Sized,
{
    let limit = limit.into();
    let tasks = collect_tasks::<_, _, E>(tasks, limit)?;
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let window = match limit {
        Concurrency::Limited(limit) => limit.min(tasks.len()),
        Concurrency::Unbounded => tasks.len(),
    };

    windowed(tasks, window).await.map_err(|Failure { error, in_flight }| {
        detach(spawner, in_flight);
        error
    })
}

fn collect_tasks<I, F, E>(tasks: I, limit: Concurrency) -> Result<Vec<F>, ParallelError<E>>
where
    I: IntoIterator<Item = F>,
{
    if limit == Concurrency::Limited(0) {
        return Err(ParallelError::InvalidConfiguration { limit: 0 });
    }
    Ok(tasks.into_iter().collect())
}

fn detach<S, Fut, T, E>(spawner: &S, in_flight: FuturesUnordered<Indexed<Fut>>)
where
    S: Spawn + ?Sized,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let siblings = in_flight.len();
    if siblings == 0 {
        return;
    }

    let drain = in_flight.for_each(|(index, outcome)| {
        tracing::trace!(index, failed = outcome.is_err(), "detached task finished");
        future::ready(())
    });

    match spawner.spawn(drain) {
        Ok(()) => tracing::debug!(siblings, "detached in-flight tasks"),
        Err(error) => tracing::warn!(siblings, %error, "spawner refused in-flight tasks, dropping them"),
    }
}

/// A task future tagged with its submission index
#[pin_project]
struct Indexed<Fut> {
    index: usize,
    #[pin]
    future: Fut,
}

impl<Fut: Future> Future for Indexed<Fut> {
    type Output = (usize, Fut::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let index = *this.index;
        this.future.poll(cx).map(|output| (index, output))
    }
}

/// The first failure, plus whatever was still running when it was seen
struct Failure<Fut, E> {
    error: ParallelError<E>,
    in_flight: FuturesUnordered<Indexed<Fut>>,
}

async fn all_at_once<F, Fut, T, E>(tasks: Vec<F>) -> Result<Vec<T>, ParallelError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    tracing::trace!(tasks = tasks.len(), "starting all tasks at once");

    let running = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| task().map_err(move |error| ParallelError::TaskFailed { index, error }));

    try_join_all(running).await.inspect_err(|error| {
        if let ParallelError::TaskFailed { index, .. } = error {
            tracing::debug!(index, "task failed");
        }
    })
}

async fn windowed<F, Fut, T, E>(tasks: Vec<F>, limit: usize) -> Result<Vec<T>, Failure<Fut, E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(tasks.len()).collect();
    let mut pending = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < limit {
            let Some((index, task)) = pending.next() else {
                break;
            };
            tracing::trace!(index, in_flight = in_flight.len() + 1, "starting task");
            in_flight.push(Indexed { index, future: task() });
        }

        // Window full, or everything started: wait for any one completion
        let Some((index, outcome)) = in_flight.next().await else {
            break;
        };

        match outcome {
            Ok(value) => results[index] = Some(value),
            Err(error) => {
                tracing::debug!(index, in_flight = in_flight.len(), "task failed");
                return Err(Failure {
                    error: ParallelError::TaskFailed { index, error },
                    in_flight,
                });
            }
        }
    }

    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        futures_util::{
            FutureExt,
            future::{BoxFuture, FutureObj},
            task::SpawnError,
        },
        std::{
            sync::{
                Arc,
                atomic::{AtomicUsize, Ordering},
            },
            thread,
            time::{Duration, Instant},
        },
        wait_native::sleep_for,
    };

    pub(crate) type Task = Box<dyn FnOnce() -> BoxFuture<'static, Result<u32, &'static str>> + Send>;

    /// Tracks how many tasks are running and the most seen at once
    #[derive(Default)]
    pub(crate) struct Probe {
        started: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Probe {
        fn enter(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        pub(crate) fn finished(&self) -> usize {
            self.finished.load(Ordering::SeqCst)
        }

        pub(crate) fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        pub(crate) fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn task(probe: &Arc<Probe>, value: u32, delay_ms: u64) -> Task {
        let probe = probe.clone();
        Box::new(move || {
            probe.enter();
            async move {
                sleep_for(Duration::from_millis(delay_ms)).await;
                probe.leave();
                Ok(value)
            }
            .boxed()
        })
    }

    pub(crate) fn failing(probe: &Arc<Probe>, error: &'static str, delay_ms: u64) -> Task {
        let probe = probe.clone();
        Box::new(move || {
            probe.enter();
            async move {
                sleep_for(Duration::from_millis(delay_ms)).await;
                probe.leave();
                Err(error)
            }
            .boxed()
        })
    }

    /// Drives each spawned future on its own thread
    struct ThreadSpawner;

    impl Spawn for ThreadSpawner {
        fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
            thread::spawn(move || blockon::block_on(future));
            Ok(())
        }
    }

    struct ShutDown;

    impl Spawn for ShutDown {
        fn spawn_obj(&self, _future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
            Err(SpawnError::shutdown())
        }
    }

    #[test]
    fn test_two_batches_of_three() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 10), task(&probe, 2, 10), task(&probe, 3, 10)];

        let start = Instant::now();
        let result = blockon::block_on(parallel(tasks, 2));

        assert_eq!(result, Ok(vec![1, 2, 3]));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(probe.peak(), 2);
    }

    #[test]
    fn test_window_timing_is_batched() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 40), task(&probe, 2, 40), task(&probe, 3, 40)];

        let start = Instant::now();
        let result = blockon::block_on(parallel(tasks, 2));
        let elapsed = start.elapsed();

        assert_eq!(result, Ok(vec![1, 2, 3]));
        // Two rounds, not one and not three
        assert!(elapsed >= Duration::from_millis(80));
        assert!(elapsed < Duration::from_millis(115));
    }

    #[test]
    fn test_never_exceeds_limit_and_keeps_submission_order() {
        let probe = Arc::new(Probe::default());
        // Later tasks finish first
        let tasks: Vec<Task> = (0..8).map(|i| task(&probe, i, 5 + u64::from(8 - i) * 4)).collect();

        let result = blockon::block_on(parallel(tasks, 3));

        assert_eq!(result, Ok((0..8).collect()));
        assert_eq!(probe.started(), 8);
        assert_eq!(probe.peak(), 3);
    }

    #[test]
    fn test_fast_path_matches_windowed_path() {
        let durations = [30, 5, 20, 1, 12];
        let expected: Vec<u32> = (0..5).collect();

        for limit in [Concurrency::Limited(2), Concurrency::Limited(5), Concurrency::Limited(50), Concurrency::Unbounded] {
            let probe = Arc::new(Probe::default());
            let tasks: Vec<Task> = durations.iter().zip(0..).map(|(&delay, value)| task(&probe, value, delay)).collect();

            let result = blockon::block_on(parallel(tasks, limit));

            assert_eq!(result.as_ref(), Ok(&expected), "limit {limit:?}");
            let peak_bound = match limit {
                Concurrency::Limited(k) => k.min(durations.len()),
                Concurrency::Unbounded => durations.len(),
            };
            assert_eq!(probe.peak(), peak_bound, "limit {limit:?}");
        }
    }

    #[test]
    fn test_empty_task_list() {
        let tasks: Vec<Task> = Vec::new();
        assert_eq!(blockon::block_on(parallel(tasks, 4)), Ok(Vec::new()));

        let tasks: Vec<Task> = Vec::new();
        assert_eq!(blockon::block_on(parallel(tasks, Concurrency::Unbounded)), Ok(Vec::new()));
    }

    #[test]
    fn test_zero_limit_is_rejected_before_any_task() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 1), task(&probe, 2, 1)];

        let result = blockon::block_on(parallel(tasks, 0));

        assert_eq!(result, Err(ParallelError::InvalidConfiguration { limit: 0 }));
        assert_eq!(probe.started(), 0);
        assert_eq!(
            result.unwrap_err().to_string(),
            "concurrency limit must be positive, got 0"
        );
    }

    #[test]
    fn test_first_failure_wins() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![
            task(&probe, 1, 200),
            failing(&probe, "boom", 5),
            task(&probe, 3, 200),
            failing(&probe, "later", 50),
        ];

        let start = Instant::now();
        let result = blockon::block_on(parallel(tasks, 2));

        assert_eq!(result, Err(ParallelError::TaskFailed { index: 1, error: "boom" }));
        assert!(start.elapsed() < Duration::from_millis(150));
        // The failure is seen as its slot frees, so nothing else starts
        assert_eq!(probe.started(), 2);
    }

    #[test]
    fn test_failure_on_fast_path() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 100), failing(&probe, "bad input", 5), task(&probe, 3, 100)];

        let start = Instant::now();
        let result = blockon::block_on(parallel(tasks, Concurrency::Unbounded));

        assert_eq!(result.unwrap_err().into_task_error(), Some("bad input"));
        assert!(start.elapsed() < Duration::from_millis(80));
    }

    #[test]
    fn test_concurrency_conversions() {
        assert_eq!(Concurrency::from(4), Concurrency::Limited(4));
        assert_eq!(Concurrency::from(None), Concurrency::Unbounded);
        assert_eq!(Concurrency::from(Some(2)), Concurrency::Limited(2));
        assert_eq!(Concurrency::default(), Concurrency::Unbounded);
    }

    #[test]
    fn test_failure_drops_in_flight_siblings() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 30), failing(&probe, "boom", 5), task(&probe, 3, 30)];

        let result = blockon::block_on(parallel(tasks, 2));
        assert_eq!(result, Err(ParallelError::TaskFailed { index: 1, error: "boom" }));

        thread::sleep(Duration::from_millis(100));
        // Only the failing task ran to the end; the third never started
        assert_eq!(probe.finished(), 1);
        assert_eq!(probe.started(), 2);
    }

    #[test]
    fn test_detached_siblings_run_to_completion() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 30), failing(&probe, "boom", 5), task(&probe, 3, 30)];

        let start = Instant::now();
        let result = blockon::block_on(parallel_detached(tasks, 2, &ThreadSpawner));

        assert_eq!(result, Err(ParallelError::TaskFailed { index: 1, error: "boom" }));
        // The error is reported without waiting for the sibling
        assert!(start.elapsed() < Duration::from_millis(25));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(probe.finished(), 2);
        assert_eq!(probe.started(), 2);
    }

    #[test]
    fn test_detached_unbounded_keeps_everyone_running() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 20), failing(&probe, "boom", 1), task(&probe, 3, 30)];

        let result = blockon::block_on(parallel_detached(tasks, Concurrency::Unbounded, &ThreadSpawner));
        assert_eq!(result.unwrap_err().into_task_error(), Some("boom"));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(probe.finished(), 3);
    }

    #[test]
    fn test_detached_success_matches_parallel() {
        let probe = Arc::new(Probe::default());
        let tasks: Vec<Task> = [15, 1, 8, 3].iter().zip(0..).map(|(&delay, value)| task(&probe, value, delay)).collect();

        let result = blockon::block_on(parallel_detached(tasks, 2, &ThreadSpawner));

        assert_eq!(result, Ok(vec![0, 1, 2, 3]));
        assert_eq!(probe.peak(), 2);
    }

    #[test]
    fn test_detached_rejects_zero_limit() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 1)];

        let result = blockon::block_on(parallel_detached(tasks, 0, &ThreadSpawner));

        assert_eq!(result, Err(ParallelError::InvalidConfiguration { limit: 0 }));
        assert_eq!(probe.started(), 0);
    }

    #[test]
    fn test_refused_spawn_still_reports_failure() {
        let probe = Arc::new(Probe::default());
        let tasks = vec![task(&probe, 1, 30), failing(&probe, "boom", 5)];

        let result = blockon::block_on(parallel_detached(tasks, 2, &ShutDown));
        assert_eq!(result, Err(ParallelError::TaskFailed { index: 1, error: "boom" }));

        thread::sleep(Duration::from_millis(60));
        assert_eq!(probe.finished(), 1);
    }
}
