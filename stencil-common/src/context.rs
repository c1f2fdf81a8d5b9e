use std::{future::Future, time::Duration};

use tokio::sync::watch;

use crate::error::Error;

/// Caller supplied bounds for a single operation.
/// ---
/// Carries an optional timeout and an optional cancellation signal.
/// Storage commits each mutation in one step after its last await point,
/// so aborting an operation never leaves a partial write behind.
#[derive(Clone, Debug, Default)]
pub struct OperationContext {
    timeout: Option<Duration>,
    cancel: Option<watch::Receiver<bool>>,
}

impl OperationContext {
    /// No timeout, no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancels the operation once `true` is sent on the paired sender.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drives `fut` to completion unless the timeout elapses or the
    /// operation is cancelled first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let cancelled = wait_for_cancel(self.cancel.clone());

        let bounded = async {
            match self.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                    Ok(res) => res,
                    Err(_) => Err(Error::Timeout),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;

            _ = cancelled => Err(Error::Cancelled),
            res = bounded => res,
        }
    }
}

async fn wait_for_cancel(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }

        if rx.changed().await.is_err() {
            // sender dropped without cancelling
            return std::future::pending().await;
        }
    }
}
