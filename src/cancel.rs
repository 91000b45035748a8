//! Cooperative cancellation signal.
//!
//! Long-running operations (crawls, extraction batches, verification
//! batches, orchestrator runs) accept a [`CancelToken`] and observe it at
//! every suspension point. Cancellation is a propagated signal, not an
//! unwinding mechanism: in-flight work finishes its current await and then
//! returns [`Error::Cancelled`](crate::error::Error::Cancelled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Cloneable cancellation handle shared between a controller and its tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if the token has been triggered.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
