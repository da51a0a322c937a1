//! Single-assignment promises with shareable futures.

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::sync::Arc;

/// A value that is set at most once and can be awaited by any number of
/// observers.
pub(crate) struct Promise<T: Clone> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
    receiver: Shared<oneshot::Receiver<T>>,
}

impl<T: Clone> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Promise<T> {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver: receiver.shared(),
        }
    }

    /// Sets the value. Returns `false` if it was already set.
    pub(crate) fn complete(&self, value: T) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                // The receiver half lives in `self`, so the send cannot fail.
                let _ = sender.send(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Resolves to the value, or to `abandoned` if every handle that could
    /// set it is gone.
    pub(crate) fn future(&self, abandoned: T) -> BoxFuture<'static, T> {
        let receiver = self.receiver.clone();
        async move { receiver.await.unwrap_or(abandoned) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_completion_wins() {
        let promise = Promise::new();
        assert!(!promise.is_done());
        assert!(promise.complete(1));
        assert!(!promise.clone().complete(2));
        assert!(promise.is_done());
        assert_eq!(promise.future(0).await, 1);
        assert_eq!(promise.future(0).await, 1);
    }
}
