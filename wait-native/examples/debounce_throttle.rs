use {
    futures_util::future::join_all,
    std::time::Duration,
    wait_native::{Debounce, Throttle, sleep_for},
};

fn main() {
    let save = Debounce::new(Duration::from_millis(100), |draft: String| {
        println!("  saving {draft:?}");
        draft.len()
    });

    let saved = blockon::block_on(async {
        let mut calls = Vec::new();
        for draft in ["h", "he", "hel", "hello"] {
            calls.push(save.call(draft.to_string()));
            sleep_for(Duration::from_millis(20)).await;
        }
        join_all(calls).await
    });
    println!("debounced results: {saved:?}");

    let report = Throttle::new(Duration::from_millis(50), |progress: u32| {
        println!("  progress {progress}%");
        progress
    });

    let reported = blockon::block_on(async {
        let mut calls = Vec::new();
        for progress in (0..=100).step_by(10) {
            calls.push(report.call(progress));
            sleep_for(Duration::from_millis(12)).await;
        }
        join_all(calls).await
    });
    println!("throttled results: {reported:?}");
}
