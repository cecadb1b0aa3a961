//! Promise Module
//!
//! Write-once promise backed by a oneshot channel whose receiving end is
//! shared between every interested caller.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::{CacheError, Result};

// == Cache Future ==
/// Readable half of a [`Promise`].
///
/// Completes at most once. Clones observe the same outcome, and a clone
/// polled after completion gets the stored outcome right away.
pub struct CacheFuture<T> {
    inner: Shared<BoxFuture<'static, Result<T>>>,
}

impl<T> CacheFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a future that is already resolved with `value`.
    pub fn from_value(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    /// Creates a future that is already failed with `error`.
    pub fn from_error(error: CacheError) -> Self {
        Self::from_result(Err(error))
    }

    fn from_result(result: Result<T>) -> Self {
        Self {
            inner: future::ready(result).boxed().shared(),
        }
    }

    fn from_receiver(receiver: oneshot::Receiver<Result<T>>) -> Self {
        let inner = receiver
            .map(|received| {
                received.unwrap_or_else(|_canceled| {
                    Err(CacheError::ContractViolation(
                        "promise dropped before it was completed".to_string(),
                    ))
                })
            })
            .boxed()
            .shared();
        Self { inner }
    }

    /// Returns the outcome if some clone of this future already observed it.
    pub fn peek(&self) -> Option<&Result<T>> {
        self.inner.peek()
    }
}

impl<T> Clone for CacheFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Future for CacheFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for CacheFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFuture").finish_non_exhaustive()
    }
}

// == Promise ==
/// Writable half of a [`CacheFuture`].
///
/// Clones share identity: completing any clone completes all of them, and
/// [`Promise::same_as`] compares that identity rather than the outcome.
pub struct Promise<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
    future: CacheFuture<T>,
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new, not yet completed promise.
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            future: CacheFuture::from_receiver(receiver),
        }
    }

    /// Returns a future resolved by this promise.
    pub fn future(&self) -> CacheFuture<T> {
        self.future.clone()
    }

    /// Completes the promise with a value. Returns false if it was already completed.
    pub fn set(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Completes the promise with an error. Returns false if it was already completed.
    pub fn set_error(&self, error: CacheError) -> bool {
        self.complete(Err(error))
    }

    /// Completes the promise with `result`, at most once.
    pub fn complete(&self, result: Result<T>) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                // The receiver lives in `self.future`, so it cannot be gone yet.
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }

    /// Returns true once the promise has been completed.
    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Returns true if both handles refer to the same promise.
    pub fn same_as(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.sender, &other.sender)
    }
}

impl<T> Default for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            future: self.future.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.sender.lock().is_none())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_promise_resolves_every_clone() {
        let promise = Promise::new();
        let first = promise.future();
        let second = promise.future();

        assert!(promise.set(42u32));

        assert_eq!(first.await, Ok(42));
        assert_eq!(second.await, Ok(42));
    }

    #[tokio::test]
    async fn test_promise_completes_at_most_once() {
        let promise = Promise::new();

        assert!(promise.set("first".to_string()));
        assert!(!promise.set("second".to_string()));
        assert!(!promise.set_error(CacheError::Loader("late".to_string())));
        assert!(promise.is_completed());

        assert_eq!(promise.future().await, Ok("first".to_string()));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_stored_outcome() {
        let promise: Promise<u8> = Promise::new();
        promise.set_error(CacheError::Backend("down".to_string()));

        let early = promise.future();
        assert!(early.clone().await.is_err());

        // Observed once, so the outcome is now available without polling.
        let late = promise.future();
        assert!(matches!(late.peek(), Some(Err(CacheError::Backend(_)))));
        assert_eq!(late.await, Err(CacheError::Backend("down".to_string())));
    }

    #[tokio::test]
    async fn test_dropped_promise_surfaces_contract_violation() {
        let future = {
            let promise: Promise<u8> = Promise::new();
            promise.future()
        };

        assert!(matches!(
            future.await,
            Err(CacheError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_promise_identity() {
        let promise: Promise<u8> = Promise::new();
        let clone = promise.clone();
        let other = Promise::new();

        assert!(promise.same_as(&clone));
        assert!(!promise.same_as(&other));
    }

    #[tokio::test]
    async fn test_ready_futures() {
        assert_eq!(CacheFuture::from_value(7u8).await, Ok(7));
        assert!(CacheFuture::<u8>::from_error(CacheError::Loader("x".to_string()))
            .await
            .is_err());
    }
}
