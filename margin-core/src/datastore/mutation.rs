//! Write-completion handles.
//!
//! A [`DatastoreMutation`] lets a caller observe, independently of the
//! returned future, the moment a derived value becomes durable. The
//! persistence layer resolves the handle with the updated `DocInfo` only
//! after the backend write has acknowledged, and rejects it when the
//! backend write fails.

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum MutationError {
    /// The write this handle was attached to failed.
    #[error("write failed: {0}")]
    Rejected(String),

    /// The write was dropped without resolving or rejecting the handle.
    #[error("the write was abandoned before completing")]
    Abandoned,

    /// `committed` was already awaited once.
    #[error("the completion of this handle was already consumed")]
    Consumed,
}

type Completion<T> = Result<T, MutationError>;

pub struct DatastoreMutation<T> {
    tx: Mutex<Option<oneshot::Sender<Completion<T>>>>,
    rx: Mutex<Option<oneshot::Receiver<Completion<T>>>>,
}

impl<T> DatastoreMutation<T> {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Resolves the handle. Later resolutions and rejections are no-ops.
    pub fn resolve(&self, value: T) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(Ok(value));
        }
    }

    /// Rejects the handle with the failure that stopped the write.
    pub fn reject(&self, reason: impl Into<String>) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(Err(MutationError::Rejected(reason.into())));
        }
    }

    /// Waits for the value to become durable. May be awaited once.
    pub async fn committed(&self) -> Result<T, MutationError> {
        let rx = self.rx.lock().take().ok_or(MutationError::Consumed)?;
        match rx.await {
            Ok(completion) => completion,
            Err(_) => Err(MutationError::Abandoned),
        }
    }
}

impl<T> Default for DatastoreMutation<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_then_committed() {
        let mutation = DatastoreMutation::new();
        mutation.resolve(42u32);
        assert_eq!(mutation.committed().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_reject() {
        let mutation: DatastoreMutation<u32> = DatastoreMutation::new();
        mutation.reject("disk full");
        match mutation.committed().await {
            Err(MutationError::Rejected(reason)) => assert_eq!(reason, "disk full"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_abandoned() {
        let mutation: DatastoreMutation<u32> = DatastoreMutation::new();
        mutation.tx.lock().take();
        assert!(matches!(
            mutation.committed().await,
            Err(MutationError::Abandoned)
        ));
    }

    #[tokio::test]
    async fn test_committed_consumes() {
        let mutation = DatastoreMutation::new();
        mutation.resolve(1u32);
        let _ = mutation.committed().await;
        assert!(matches!(
            mutation.committed().await,
            Err(MutationError::Consumed)
        ));
    }
}
