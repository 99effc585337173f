use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::killswitch::KillSwitch;

/// A one-shot deadline that force-closes `kill` if it isn't disarmed
/// in time.
///
/// Used for both the response-header timer and the whole-request
/// timer — they're the same mechanism armed for different durations
/// and disarmed at different points in the attempt's lifecycle.
pub(crate) struct Timer {
    cancel: Option<oneshot::Sender<()>>,
    fired: Arc<AtomicBool>,
}

impl Timer {
    /// Spawns a background task that closes `kill` after `duration`
    /// unless disarmed first.
    pub(crate) fn arm(duration: Duration, kill: KillSwitch) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let fired_for_task = fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    // Order matters: the flag must be visible before
                    // the socket actually closes, since the caller
                    // only observes `fired` after seeing the I/O
                    // error that the close causes.
                    fired_for_task.store(true, Ordering::SeqCst);
                    kill.close();
                },
                _ = cancel_rx => {},
            }
        });

        Self { cancel: Some(cancel_tx), fired }
    }

    /// Disarms the timer. If it already fired this is a harmless
    /// no-op; the connection is already closed.
    pub(crate) fn disarm(mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
