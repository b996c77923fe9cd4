//! Cooperative cancellation
//!
//! The interrupt handler only flips an atomic flag. The acquisition loop
//! polls it once per line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Route Ctrl-C (SIGINT) to `token`
///
/// Can only be installed once per process.
pub fn install_interrupt_handler(token: &CancellationToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || token.cancel())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let handler_side = token.clone();
        assert!(!token.is_cancelled());

        handler_side.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = CancellationToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
