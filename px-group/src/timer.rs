//! Timer
use fnv::FnvHashMap;
use futures_timer::Delay;
use log::trace;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use paxos_rs::CommitNotifier;
use px_data::MsgId;

use crate::utils::lock;

/// Parks local broadcasters until their message is committed.
///
/// A waiter is registered before its message is sent, so a commit that
/// races ahead of the wait leaves a permit behind instead of being lost.
pub struct WaitingTimer {
    waiters: Mutex<FnvHashMap<MsgId, Arc<Notify>>>,
    wait_timeout: Duration,
}

impl WaitingTimer {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            waiters: Mutex::new(FnvHashMap::default()),
            wait_timeout,
        }
    }

    pub fn register(&self, msg_id: MsgId) -> Arc<Notify> {
        lock(&self.waiters)
            .entry(msg_id)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn deregister(&self, msg_id: MsgId) {
        lock(&self.waiters).remove(&msg_id);
    }

    /// True if the message committed within the wait timeout.
    pub async fn wait_a_little(&self, notify: &Notify) -> bool {
        tokio::select! {
            () = notify.notified() => true,
            () = Delay::new(self.wait_timeout) => false,
        }
    }

    pub fn num_waiting(&self) -> usize {
        lock(&self.waiters).len()
    }
}

impl CommitNotifier for WaitingTimer {
    fn unblock(&self, msg_id: MsgId) {
        if let Some(n) = lock(&self.waiters).get(&msg_id) {
            trace!("unblock {}", msg_id);
            n.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_commit_before_wait() {
        let t = WaitingTimer::new(Duration::from_secs(5));
        let n = t.register(7);
        t.unblock(7);

        let st = Instant::now();
        assert!(t.wait_a_little(&n).await);
        assert!(st.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_times_out() {
        let t = WaitingTimer::new(Duration::from_millis(50));
        let n = t.register(7);
        // other ids don't wake this waiter
        t.unblock(8);
        assert!(!t.wait_a_little(&n).await);

        t.deregister(7);
        assert_eq!(t.num_waiting(), 0);
    }

    #[tokio::test]
    async fn test_unblock_wakes_waiter() {
        let t = Arc::new(WaitingTimer::new(Duration::from_secs(5)));
        let n = t.register(1);
        let t2 = t.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            t2.unblock(1);
        });
        assert!(t.wait_a_little(&n).await);
    }
}
