use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

/// Opaque identifier of one in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counts API calls in flight so session renewal can wait for them.
///
/// Membership and the published count change under one lock; the count is
/// broadcast on a watch channel so drain waiters wake without polling.
pub struct OperationTracker {
    live: Mutex<HashMap<OperationId, String>>,
    count: watch::Sender<usize>,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            live: Mutex::new(HashMap::new()),
            count,
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<OperationId, String>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an operation. It stays in flight until the guard is ended
    /// or dropped.
    pub fn begin(self: &Arc<Self>, label: &str) -> OperationGuard {
        let id = OperationId::new();
        {
            let mut live = self.live();
            live.insert(id.clone(), label.to_string());
            self.count.send_replace(live.len());
            trace!(op = %id, label, in_flight = live.len(), "operation started");
        }
        OperationGuard {
            tracker: Arc::clone(self),
            id,
            ended: false,
        }
    }

    /// Deregisters an operation. Returns `false` if `id` was not in flight,
    /// so repeated calls never drive the count below zero.
    pub fn end(&self, id: &OperationId) -> bool {
        let mut live = self.live();
        let Some(label) = live.remove(id) else {
            return false;
        };
        self.count.send_replace(live.len());
        trace!(op = %id, label = %label, in_flight = live.len(), "operation finished");
        true
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.live().len()
    }

    /// Labels of the operations currently in flight.
    pub fn labels(&self) -> Vec<String> {
        self.live().values().cloned().collect()
    }

    /// Waits until no operation is in flight.
    ///
    /// Returns `true` once drained, `false` if `timeout` elapsed first.
    pub async fn await_drained(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.count.subscribe();
        let drained = async move { rx.wait_for(|n| *n == 0).await.is_ok() };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, drained).await.unwrap_or(false),
            None => drained.await,
        }
    }
}

/// Keeps one operation registered while alive.
#[must_use = "dropping the guard ends the operation immediately"]
pub struct OperationGuard {
    tracker: Arc<OperationTracker>,
    id: OperationId,
    ended: bool,
}

impl OperationGuard {
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    /// Ends the operation now.
    pub fn end(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.ended {
            self.ended = true;
            self.tracker.end(&self.id);
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for OperationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationGuard")
            .field("id", &self.id)
            .field("ended", &self.ended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_end_counts() {
        let tracker = Arc::new(OperationTracker::new());
        let a = tracker.begin("a");
        let b = tracker.begin("b");
        assert_eq!(tracker.in_flight(), 2);
        let mut labels = tracker.labels();
        labels.sort();
        assert_eq!(labels, vec!["a", "b"]);

        a.end();
        assert_eq!(tracker.in_flight(), 1);
        drop(b);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn end_is_idempotent() {
        let tracker = Arc::new(OperationTracker::new());
        let guard = tracker.begin("x");
        let id = guard.id().clone();
        assert!(tracker.end(&id));
        assert!(!tracker.end(&id));
        drop(guard);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn unknown_id_ignored() {
        let tracker = Arc::new(OperationTracker::new());
        let _guard = tracker.begin("x");
        assert!(!tracker.end(&OperationId::new()));
        assert_eq!(tracker.in_flight(), 1);
    }

    #[test]
    fn guard_released_on_error_path() {
        fn step(fail: bool) -> Result<(), &'static str> {
            if fail { Err("boom") } else { Ok(()) }
        }
        fn failing(tracker: &Arc<OperationTracker>) -> Result<(), &'static str> {
            let _op = tracker.begin("failing");
            step(true)?;
            step(false)
        }
        let tracker = Arc::new(OperationTracker::new());
        assert!(failing(&tracker).is_err());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn ids_are_unique() {
        let tracker = Arc::new(OperationTracker::new());
        let a = tracker.begin("same");
        let b = tracker.begin("same");
        assert_ne!(a.id(), b.id());
        assert_eq!(tracker.in_flight(), 2);
    }

    #[test]
    fn concurrent_begin_end_never_negative() {
        use std::thread;

        let tracker = Arc::new(OperationTracker::new());
        let mut handles = vec![];
        for i in 0..8 {
            let t = Arc::clone(&tracker);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let guard = t.begin(&format!("op-{i}-{j}"));
                    assert!(t.in_flight() >= 1);
                    if j % 2 == 0 {
                        guard.end();
                    } else {
                        let id = guard.id().clone();
                        assert!(t.end(&id));
                        drop(guard);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(*tracker.count.borrow(), 0);
    }

    #[tokio::test]
    async fn await_drained_immediate_when_idle() {
        let tracker = Arc::new(OperationTracker::new());
        assert!(tracker.await_drained(None).await);
        assert!(tracker.await_drained(Some(Duration::ZERO)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn await_drained_times_out() {
        let tracker = Arc::new(OperationTracker::new());
        let _guard = tracker.begin("slow");
        assert!(!tracker.await_drained(Some(Duration::from_secs(5))).await);
    }

    #[tokio::test]
    async fn await_drained_wakes_on_last_end() {
        let tracker = Arc::new(OperationTracker::new());
        let a = tracker.begin("a");
        let b = tracker.begin("b");

        let waiter = {
            let t = Arc::clone(&tracker);
            tokio::spawn(async move { t.await_drained(None).await })
        };

        tokio::task::yield_now().await;
        a.end();
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        b.end();
        assert!(waiter.await.unwrap());
    }
}
