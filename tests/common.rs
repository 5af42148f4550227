#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagepipe::pipeline::send::{send_or_cancel, Delivery};
use stagepipe::pipeline::stage::{stage_fn, Sequence, Stage};
use tokio::sync::mpsc;

/// Already-closed sequence holding `items`.
pub fn seq<T: Send + 'static>(items: Vec<T>) -> Sequence<T> {
    let (tx, rx) = mpsc::channel(items.len().max(1));
    for item in items {
        tx.try_send(item).expect("channel sized for all items");
    }
    rx
}

pub async fn collect<T>(mut seq: Sequence<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(v) = seq.recv().await {
        out.push(v);
    }
    out
}

/// Collects the rest of `seq`, failing the test if it does not close in time.
pub async fn collect_within<T>(seq: Sequence<T>, within: Duration) -> Vec<T> {
    tokio::time::timeout(within, collect(seq))
        .await
        .expect("sequence did not close in time")
}

/// Counts tasks spawned by [`tracked`] stages that are still alive.
#[derive(Clone, Default)]
pub struct LiveTasks(Arc<AtomicUsize>);

pub struct TaskGuard(Arc<AtomicUsize>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LiveTasks {
    pub fn guard(&self) -> TaskGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        TaskGuard(self.0.clone())
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self, within: Duration) -> bool {
        let idle = async {
            while self.count() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(within, idle).await.is_ok()
    }
}

/// Pass-through stage whose task is counted by `live`.
pub fn tracked<T: Send + 'static>(live: &LiveTasks, name: &'static str) -> impl Stage<T, T> {
    let live = live.clone();
    stage_fn(name, move |mut input: Sequence<T>, cx| {
        let (output, rx) = cx.channel(name);
        let cancel = cx.cancel().clone();
        let guard = live.guard();

        cx.spawn(name, async move {
            let _guard = guard;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    msg = input.recv() => {
                        let Some(v) = msg else { break; };
                        if send_or_cancel(&output, v, &cancel).await != Delivery::Sent {
                            break;
                        }
                    }
                }
            }
        });

        rx
    })
}
