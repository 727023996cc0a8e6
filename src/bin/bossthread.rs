use std::thread;
use tracing::{error, info};
use wkrpc::calibrate::{CALIBRATION_TARGET, calibrate, hog};

const MAX_THREAD: u64 = 4;

/// Spawns workers with increasing amounts of computation and joins them in
/// the same order. Each worker emits one event when it starts and one when it
/// finishes.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("bossthread=info,info")
        .with_thread_ids(true)
        .init();

    // count up to 10ms
    let max = calibrate(CALIBRATION_TARGET);
    info!("Calibrated {} units per {:?}", max, CALIBRATION_TARGET);

    let workers: Vec<_> = (1..=MAX_THREAD)
        .map(|i| thread::spawn(move || worker(max * i)))
        .collect();

    for (i, handle) in workers.into_iter().enumerate() {
        match handle.join() {
            Ok(res) => info!(worker = i, res, "joined"),
            Err(_) => error!(worker = i, "worker panicked"),
        }
    }
}

fn worker(count: u64) -> u64 {
    let id = thread::current().id();
    info!(thread = ?id, count, "worker started");
    let res = hog(count);
    info!(thread = ?id, "worker finished");
    res
}
