//! Run flag owned by a scheduler instance.

use tokio::sync::watch;

/// The `running` flag with change notification.
///
/// At most one run can hold the flag: [`try_begin`](Self::try_begin) is a
/// compare-and-set, so concurrent `start` commands are single-flight.
pub struct RunState {
    running: watch::Sender<bool>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    /// Create an idle run state.
    #[must_use]
    pub fn new() -> Self {
        let (running, _) = watch::channel(false);
        Self { running }
    }

    /// Set the flag if it is clear. Returns `false` when a run is already active.
    pub fn try_begin(&self) -> bool {
        self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        })
    }

    /// Clear the flag on operator request. Returns whether a run was active.
    pub fn request_stop(&self) -> bool {
        self.running.send_if_modified(|running| {
            let was_running = *running;
            *running = false;
            was_running
        })
    }

    /// Clear the flag at the end of a run. Idempotent.
    pub fn finish(&self) {
        self.running.send_replace(false);
    }

    /// Whether a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Watch for flag changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Resolve once the flag is clear.
    pub async fn stopped(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|running| !*running).await;
    }
}

/// Clears the run flag when dropped, including on unwind.
pub(crate) struct RunGuard<'a>(pub(crate) &'a RunState);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}
