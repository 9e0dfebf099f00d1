//! Scoped ownership of an acquired environment.

use std::sync::Arc;

use tracing::warn;

use super::Environment;
use crate::Result;

/// Owns an acquired environment until it is released.
///
/// [`release`](Self::release) consumes the lease. If the lease is dropped
/// without being released (panic, cancelled future), teardown is spawned
/// onto the current runtime so the environment is still released once.
pub struct EnvironmentLease {
    env: Arc<dyn Environment>,
    released: bool,
}

impl EnvironmentLease {
    /// Take ownership of a freshly acquired environment.
    #[must_use]
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            env,
            released: false,
        }
    }

    /// Shared handle for step execution and the preview producer.
    #[must_use]
    pub fn env(&self) -> &Arc<dyn Environment> {
        &self.env
    }

    /// Release the environment.
    ///
    /// # Errors
    ///
    /// Propagates the driver's teardown error. The lease is spent either way.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.env.release().await
    }
}

impl Drop for EnvironmentLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let env = Arc::clone(&self.env);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = env.release().await {
                        warn!(%err, "deferred environment release failed");
                    }
                });
            }
            Err(_) => warn!("environment lease dropped outside a runtime; release skipped"),
        }
    }
}
