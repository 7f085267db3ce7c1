use {
    std::{
        convert::Infallible,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    },
    tracing_subscriber::EnvFilter,
    wait_native::{AbortController, WaitOptions, exponential_backoff, sleep_until},
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wait_native=trace")))
        .init();

    let ready = Arc::new(AtomicBool::new(false));
    let flag = ready.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(250));
        flag.store(true, Ordering::Release);
    });

    let start = Instant::now();
    let options = WaitOptions::new()
        .timeout(Duration::from_secs(2))
        .backoff(exponential_backoff(Duration::from_millis(10), Duration::from_millis(100)));

    let result = blockon::block_on(sleep_until(
        || {
            let ready = ready.clone();
            async move { Ok::<_, Infallible>(ready.load(Ordering::Acquire)) }
        },
        options,
    ));
    println!("flag observed: {result:?} after {:?}", start.elapsed());

    // Same wait, abandoned from another thread
    let controller = AbortController::new();
    let signal = controller.signal();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(120));
        controller.abort_with("operator gave up");
    });

    let result = blockon::block_on(sleep_until(
        || async { Ok::<Option<()>, Infallible>(None) },
        WaitOptions::new().interval(Duration::from_millis(25)).signal(signal),
    ));
    println!("second wait: {result:?}");
}
