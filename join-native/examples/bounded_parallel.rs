use {
    futures_util::{FutureExt, future::BoxFuture},
    join_native::{any, create_promise, parallel, race_with_timeout},
    std::{
        thread,
        time::{Duration, Instant},
    },
    tracing_subscriber::EnvFilter,
    wait_native::sleep_for,
};

type Fetch = Box<dyn FnOnce() -> BoxFuture<'static, Result<String, String>> + Send>;

fn fetch(page: u32, latency_ms: u64) -> Fetch {
    Box::new(move || {
        async move {
            sleep_for(Duration::from_millis(latency_ms)).await;
            if latency_ms > 150 {
                Err(format!("page {page} too slow"))
            } else {
                Ok(format!("page {page}"))
            }
        }
        .boxed()
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("join_native=trace")))
        .init();

    let start = Instant::now();
    let pages = (1..=6).map(|page| fetch(page, 20 + u64::from(page % 3) * 15));
    let result = blockon::block_on(parallel(pages, 2));
    println!("two at a time: {result:?} in {:?}", start.elapsed());

    let pages = vec![fetch(1, 30), fetch(2, 200), fetch(3, 10)];
    let result = blockon::block_on(parallel(pages, 3));
    println!("with a failure: {result:?}");

    let mirrors = vec![fetch(7, 200)(), fetch(7, 40)(), fetch(7, 90)()];
    println!("first mirror: {:?}", blockon::block_on(any(mirrors)));

    let racers = vec![fetch(8, 120)(), fetch(9, 140)()];
    println!(
        "race: {:?}",
        blockon::block_on(race_with_timeout(racers, Duration::from_millis(50)))
    );

    let (resolver, promise) = create_promise();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        let _ = resolver.resolve("settled elsewhere");
    });
    println!("promise: {:?}", blockon::block_on(promise));
}
