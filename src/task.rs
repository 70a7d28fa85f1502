use std::future::Future;
use tokio::task::JoinHandle;

/// Handle to a background loop. The loop stops on `cancel()` or when the
/// handle is dropped; it never outlives its owner.
#[derive(Debug)]
pub struct TaskHandle {
    inner: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: Some(tokio::spawn(fut)),
        }
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    /// True once the loop returned on its own or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().map_or(true, |h| h.is_finished())
    }

    fn abort(&mut self) {
        if let Some(handle) = self.inner.take() {
            handle.abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ticking(count: Arc<AtomicUsize>) -> TaskHandle {
        TaskHandle::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = ticking(count.clone());
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let before = count.load(Ordering::SeqCst);
        assert!(before >= 2);
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(ticking(count.clone()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(count.load(Ordering::SeqCst) <= 1);
    }
}
