//! Run-level cancellation.
//!
//! A [`CancelToken`] is a cheap clonable flag the CLI flips on Ctrl-C. The
//! discovery engine checks it between page fetches and the download engine
//! checks it before issuing each new download; in-flight work is allowed to
//! finish so its results can still be persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable cancellation flag shared between the pipeline and its stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
