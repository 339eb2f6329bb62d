//! Demo: a replicated key-value cache on top of a Paxos group.

pub mod cache;
pub mod config;
pub mod utils;

use futures::future::join_all;
use log::{info, warn};
use std::time::{Duration, Instant};

pub use cache::{CacheErr, CacheEvent, CacheHandle, CacheOp, ReplicatedCache};
pub use config::{ConfigErr, NodeConfig, TestConfig};

/// Key written by member `position` in a scripted run.
pub fn test_key(position: usize, i: usize) -> String {
    format!("k-{}-{}", position, i)
}

/// Scripted run: puts `put_num` keys, then waits until the keys of all
/// `num` members are present. Returns true if they all showed up in time.
pub async fn run_local_cluster(
    cache: &CacheHandle,
    position: usize,
    num: usize,
    put_num: usize,
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    let puts = (0..put_num).map(|i| {
        let key = test_key(position, i);
        async move { (cache.put(&key, &position.to_string()).await, key) }
    });
    for (res, key) in join_all(puts).await {
        if let Err(e) = res {
            warn!("put {} failed: {}", key, e);
            return false;
        }
    }
    info!("{} keys committed in {:?}", put_num, start.elapsed());

    let expected = (0..num).flat_map(|p| (0..put_num).map(move |i| test_key(p, i)));
    let expected = expected.collect::<Vec<_>>();
    while start.elapsed() < timeout {
        if expected.iter().all(|k| cache.get(k).is_some()) {
            info!("cluster converged in {:?}", start.elapsed());
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    warn!("timed out with {} of {} keys", cache.len(), expected.len());
    false
}
