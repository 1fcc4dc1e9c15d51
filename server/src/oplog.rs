//! Operation log — the append-only canvas history.
//!
//! The order of this log is the one total order of the system: replaying it
//! from the start reproduces the canvas on any client.

use tokio::sync::RwLock;

use crate::types::Operation;

#[derive(Debug, Default)]
pub struct OperationLog {
    ops: RwLock<Vec<Operation>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `op`. Returns its position in the log.
    pub async fn append(&self, op: Operation) -> usize {
        self.append_with(op, |_| ()).await
    }

    /// Append `op` and run `publish` on it before any later append can land.
    /// Whatever `publish` emits is therefore emitted in log order.
    pub async fn append_with<F>(&self, op: Operation, publish: F) -> usize
    where
        F: FnOnce(&Operation),
    {
        let mut ops = self.ops.write().await;
        ops.push(op);
        let index = ops.len() - 1;
        publish(&ops[index]);
        index
    }

    /// Copy of everything recorded so far.
    pub async fn snapshot(&self) -> Vec<Operation> {
        self.ops.read().await.clone()
    }

    /// Run `read` against the current log with appends held off.
    ///
    /// Appends wait until `read` returns, so keep it to work that must see
    /// a fixed log (the `init` reply encodes the whole history in here).
    pub async fn with_snapshot<R>(&self, read: impl FnOnce(&[Operation]) -> R) -> R {
        let ops = self.ops.read().await;
        read(&ops)
    }

    pub async fn len(&self) -> usize {
        self.ops.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ops.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn op(n: usize) -> Operation {
        Operation::from_text(&format!(r#"{{"type":"paint","payload":{{"x":{n}}}}}"#)).unwrap()
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_appends() {
        let log = OperationLog::new();
        assert_eq!(log.append(op(0)).await, 0);
        let before = log.snapshot().await;
        assert_eq!(log.append(op(1)).await, 1);

        assert_eq!(before.len(), 1);
        assert_eq!(log.len().await, 2);
        assert_eq!(log.snapshot().await[1].as_str(), op(1).as_str());
    }

    #[tokio::test]
    async fn publish_runs_in_append_order() {
        let log = OperationLog::new();
        let mut published = Vec::new();
        for n in 0..3 {
            log.append_with(op(n), |o| published.push(o.as_str().to_owned())).await;
        }
        let replay: Vec<String> = log.snapshot().await.iter().map(|o| o.as_str().to_owned()).collect();
        assert_eq!(published, replay);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_snapshots_only_grow_by_prefix() {
        let log = Arc::new(OperationLog::new());

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    for n in 0..50 {
                        log.append(op(w * 1000 + n)).await;
                    }
                })
            })
            .collect();

        let reader = {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut snapshots = Vec::new();
                for _ in 0..50 {
                    snapshots.push(log.snapshot().await);
                    tokio::task::yield_now().await;
                }
                snapshots
            })
        };

        for w in writers {
            w.await.unwrap();
        }
        let mut snapshots = reader.await.unwrap();
        snapshots.push(log.snapshot().await);

        for pair in snapshots.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            assert!(earlier.len() <= later.len());
            for (a, b) in earlier.iter().zip(later.iter()) {
                assert_eq!(a.as_str(), b.as_str());
            }
        }
        assert_eq!(snapshots.last().unwrap().len(), 400);
    }
}
