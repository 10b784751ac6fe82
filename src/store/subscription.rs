use tokio::sync::mpsc;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Живая подписка на изменения в хранилище.
///
/// Отписка происходит при `cancel()` или при drop, повторной отписки не бывает.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    on_cancel: Option<CancelHook>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Ждёт следующее изменение. `None` значит, что источник закрыт.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Изменение, которое уже доставлено, без ожидания
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn cancel_runs_hook_once() {
        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = Subscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(7).unwrap();
        assert_eq!(sub.recv().await, Some(7));
        assert_eq!(sub.try_recv(), None);

        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tx.send(8).is_err());
    }
}
