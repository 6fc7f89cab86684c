use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{nothing_to_do, OPERATION_CANCELED_MSG};

#[derive(Default)]
struct CancellationState {
    signal: Notify,
    handlers: Mutex<Vec<Box<dyn Fn() + Send>>>,
    is_cancellation_requested: AtomicBool,
}

/// Lightweight, cloneable handle used to request and observe cancellation of a
/// single cooperative task tree (one `tradeId`'s worth of listeners, or the
/// whole process). Cancellation is silent: callers that only want to stop
/// cleanly should check [`CancellationToken::is_cancellation_requested`]
/// between suspension points rather than treating it as an error.
#[derive(Default, Clone)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let state = &self.state;
        state
            .is_cancellation_requested
            .store(true, Ordering::SeqCst);
        state.handlers.lock().iter().for_each(|handler| handler());
        state.signal.notify_waiters();
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.state.is_cancellation_requested.load(Ordering::SeqCst)
    }

    pub fn error_if_cancellation_requested(&self) -> Result<()> {
        match self.is_cancellation_requested() {
            true => bail!(OPERATION_CANCELED_MSG),
            false => Ok(()),
        }
    }

    pub async fn when_cancelled(&self) {
        if self.is_cancellation_requested() {
            return;
        }
        self.state.signal.notified().await;
    }

    /// Creates a child token cancelled whenever `self` is cancelled (but not
    /// vice versa) — used to scope one `tradeId`'s tasks under the process
    /// lifetime token without letting a tradeId teardown affect siblings.
    pub fn create_linked_token(&self) -> Self {
        let new_token = CancellationToken::new();

        let weak = Arc::downgrade(&new_token.state);
        self.register_handler(Box::new(move || match weak.upgrade() {
            None => nothing_to_do(),
            Some(state) => CancellationToken { state }.cancel(),
        }));

        if self.is_cancellation_requested() {
            new_token.cancel();
        }

        new_token
    }

    fn register_handler(&self, handler: Box<dyn Fn() + Send>) {
        self.state.handlers.lock().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn linked_token_cancels_with_parent() {
        let parent = CancellationToken::new();
        let child = parent.create_linked_token();

        assert!(!child.is_cancellation_requested());
        parent.cancel();
        assert!(child.is_cancellation_requested());
    }

    #[tokio::test]
    async fn when_cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        token.when_cancelled().await;
    }
}
