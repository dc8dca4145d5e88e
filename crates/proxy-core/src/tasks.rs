// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Bounded fire-and-forget work queue
//!
//! Cache writes and telemetry run after the response has been produced.
//! Submission never waits: when the queue is full the task is dropped and
//! counted. A single worker pulls tasks and runs at most `max_concurrency`
//! of them at once. Shutdown stops intake and drains what was queued.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    sync::{Mutex, Semaphore, mpsc},
    task::{JoinError, JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BackgroundConfig;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to the background queue
#[derive(Debug)]
pub struct BackgroundTasks {
    sender: mpsc::Sender<(&'static str, Task)>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl BackgroundTasks {
    /// Start the worker on the current runtime
    pub fn spawn(config: BackgroundConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));

        let worker = tokio::spawn(run_worker(receiver, semaphore, shutdown.clone()));

        Self {
            sender,
            shutdown,
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a task, returning whether it was accepted
    pub fn submit<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.sender.try_send((name, Box::pin(task))) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(task = name, "background queue full, dropping task");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(task = name, "background queue closed, dropping task");
                false
            }
        }
    }

    /// Tasks dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting tasks and wait for queued and running ones to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let Some(worker) = self.worker.lock().await.take() else {
            return;
        };
        if let Err(e) = worker.await {
            error!(error = %e, "background worker failed");
        }
        info!(dropped = self.dropped(), "background queue drained");
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<(&'static str, Task)>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let mut running = JoinSet::new();
    let mut closing = false;

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled(), if !closing => {
                receiver.close();
                closing = true;
                continue;
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                log_join(joined);
                continue;
            }
            next = receiver.recv() => next,
        };

        let Some((name, task)) = next else {
            break;
        };
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        running.spawn(async move {
            task.await;
            drop(permit);
            name
        });
    }

    while let Some(joined) = running.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<&'static str, JoinError>) {
    match joined {
        Ok(name) => debug!(task = name, "background task finished"),
        Err(e) => error!(error = %e, "background task failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use tokio::sync::Notify;

    use super::*;

    fn config(queue_capacity: usize, max_concurrency: usize) -> BackgroundConfig {
        BackgroundConfig {
            queue_capacity,
            max_concurrency,
        }
    }

    #[tokio::test]
    async fn runs_and_drains_on_shutdown() {
        let tasks = BackgroundTasks::spawn(config(64, 4));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let done = done.clone();
            assert!(tasks.submit("count", async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        tasks.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(tasks.dropped(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_tasks() {
        let tasks = BackgroundTasks::spawn(config(1, 1));
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let (gate, signal) = (release.clone(), started.clone());
        assert!(tasks.submit("blocker", async move {
            signal.notify_one();
            gate.notified().await;
        }));
        started.notified().await;

        // the worker now waits for a permit while holding the next task,
        // so at most one more fits in the queue
        let accepted = (0..10)
            .filter(|_| tasks.submit("filler", async {}))
            .count();
        assert!(accepted <= 2);
        assert!(tasks.dropped() >= 8);

        release.notify_one();
        tasks.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let tasks = BackgroundTasks::spawn(config(8, 1));
        tasks.shutdown().await;
        assert!(!tasks.submit("late", async {}));
        assert_eq!(tasks.dropped(), 1);

        // a second shutdown is a no-op
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let tasks = BackgroundTasks::spawn(config(64, 2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let (active, peak) = (active.clone(), peak.clone());
            tasks.submit("sleepy", async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        tasks.shutdown().await;
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_the_worker() {
        let tasks = BackgroundTasks::spawn(config(8, 1));
        let done = Arc::new(AtomicUsize::new(0));

        #[allow(clippy::panic)]
        tasks.submit("boom", async { panic!("task failure") });
        let counter = done.clone();
        tasks.submit("after", async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tasks.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
