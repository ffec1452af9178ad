use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

/// Cancellation signal threaded through every long-running operation.
///
/// The token carries both a flag for cheap polling and a channel end that can
/// be multiplexed into `crossbeam_channel::select!` so blocked sends and
/// receives unblock the moment cancellation fires.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    signal: Receiver<()>,
}

pub struct Canceller {
    flag: Arc<AtomicBool>,
    // Kept only so that dropping it closes the receiver side.
    _guard: Sender<()>,
}

/// Create a linked canceller/token pair.
pub fn cancel_pair() -> (Canceller, CancelToken) {
    let flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = bounded::<()>(0);

    (
        Canceller {
            flag: flag.clone(),
            _guard: tx,
        },
        CancelToken { flag, signal: rx },
    )
}

impl Canceller {
    /// Fire the cancellation. Consuming the canceller drops the channel
    /// sender, which wakes every `select!` waiting on the token.
    pub fn cancel(self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Channel end for use in `select!`; any receive completion (value or
    /// disconnect) means the token has fired.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }

    /// A token that never fires, for callers without a cancellation source.
    pub fn unfired() -> CancelToken {
        let (canceller, token) = cancel_pair();
        // Leak the sender so the channel stays open for the token's lifetime.
        std::mem::forget(canceller);
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_observes_cancel() {
        let (canceller, token) = cancel_pair();
        assert!(!token.is_cancelled());
        canceller.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unblocks_select() {
        let (canceller, token) = cancel_pair();
        canceller.cancel();
        // Disconnected channel: recv returns immediately.
        assert!(token.signal().recv().is_err());
    }

    #[test]
    fn unfired_token_stays_quiet() {
        let token = CancelToken::unfired();
        assert!(!token.is_cancelled());
        assert!(token.signal().try_recv().is_err());
    }
}
