use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::error::HostError;

pub type MainThreadTask = Box<dyn FnOnce() + Send + 'static>;

/// Queue of work that must run on the host's main thread. The host drains it
/// from its own tick loop; background tasks post to it through a
/// [`MainThreadHandle`].
pub struct MainThreadQueue {
    sender: Sender<MainThreadTask>,
    receiver: Receiver<MainThreadTask>,
}

#[derive(Clone)]
pub struct MainThreadHandle {
    sender: Sender<MainThreadTask>,
}

impl MainThreadQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    #[must_use]
    pub fn handle(&self) -> MainThreadHandle {
        MainThreadHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run every queued task on the calling thread. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        for task in self.receiver.try_iter() {
            task();
            ran += 1;
        }
        if ran > 0 {
            debug!("Ran {ran} main thread task(s)");
        }
        ran
    }
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainThreadHandle {
    /// Queue a task without waiting for it.
    ///
    /// # Errors
    /// Returns [`HostError::MainThreadClosed`] once the queue has been dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), HostError> {
        self.sender
            .send(Box::new(task))
            .map_err(|_| HostError::MainThreadClosed)
    }

    /// Queue a task and wait for the main thread to run it.
    ///
    /// # Errors
    /// Returns [`HostError::MainThreadClosed`] if the queue is dropped before
    /// the task runs.
    pub async fn run<T, F>(&self, task: F) -> Result<T, HostError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.post(move || {
            let _ = tx.send(task());
        })?;
        rx.await.map_err(|_| HostError::MainThreadClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::MainThreadQueue;
    use crate::HostError;

    #[test]
    fn drain_runs_posted_tasks_in_order() {
        let queue = MainThreadQueue::new();
        let handle = queue.handle();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        for value in 0..3 {
            let seen = Arc::clone(&seen);
            handle
                .post(move || seen.lock().expect("lock").push(value))
                .expect("queue should accept tasks");
        }

        assert_eq!(queue.drain(), 3);
        assert_eq!(*seen.lock().expect("lock"), vec![0, 1, 2]);
        assert_eq!(queue.drain(), 0);
    }

    #[tokio::test]
    async fn run_returns_value_computed_on_draining_thread() {
        let queue = MainThreadQueue::new();
        let handle = queue.handle();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_task = Arc::clone(&calls);

        let pending = tokio::spawn(async move {
            handle
                .run(move || {
                    calls_for_task.fetch_add(1, Ordering::SeqCst);
                    42
                })
                .await
        });

        while queue.drain() == 0 {
            tokio::task::yield_now().await;
        }

        let value = pending
            .await
            .expect("task should join")
            .expect("main thread should answer");
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_fails_after_queue_is_dropped() {
        let queue = MainThreadQueue::new();
        let handle = queue.handle();
        drop(queue);

        assert!(matches!(
            handle.post(|| {}),
            Err(HostError::MainThreadClosed)
        ));
    }
}
