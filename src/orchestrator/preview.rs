//! Periodic low-fidelity preview frames.
//!
//! Runs beside step execution for the lifetime of one environment. The
//! producer checks liveness before every capture and stops itself once the
//! environment is gone; the session runner also stops it explicitly before
//! releasing the environment.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::driver::Environment;
use crate::observer::ObserverHub;

/// Builder for a preview producer.
pub struct PreviewStreamer {
    interval: Duration,
    quality: u8,
    hub: ObserverHub,
}

impl PreviewStreamer {
    /// Construct a producer (does not start it yet).
    #[must_use]
    pub fn new(interval: Duration, quality: u8, hub: ObserverHub) -> Self {
        Self {
            interval,
            quality,
            hub,
        }
    }

    /// Spawn the capture loop against `env`.
    #[must_use]
    pub fn spawn(self, env: Arc<dyn Environment>) -> PreviewHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(
            Self::run(self.interval, self.quality, self.hub, env, task_cancel)
                .instrument(info_span!("preview_stream")),
        );
        PreviewHandle {
            cancel,
            join: Some(join),
        }
    }

    async fn run(
        interval: Duration,
        quality: u8,
        hub: ObserverHub,
        env: Arc<dyn Environment>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !env.is_alive() {
                debug!("environment gone; preview producer exiting");
                break;
            }

            let frame = tokio::select! {
                () = cancel.cancelled() => break,
                frame = env.capture_frame(quality) => frame,
            };

            match frame {
                Ok(jpeg) if env.is_alive() && !cancel.is_cancelled() => hub.preview(&jpeg),
                Ok(_) => break,
                Err(err) => debug!(%err, "preview capture failed"),
            }
        }
    }
}

/// Control handle for a running preview producer.
pub struct PreviewHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl PreviewHandle {
    /// Stop the producer and wait until it can no longer emit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
