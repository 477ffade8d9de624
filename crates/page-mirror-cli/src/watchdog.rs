//! Independent teardown timer for hung sessions.
//!
//! The watchdog only holds a weak reference to the renderer. If the session
//! already released the browser by the time it fires, there is nothing left
//! to close and that is not an error.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::renderer::Renderer;

pub struct Watchdog {
    task: JoinHandle<()>,
    fired: watch::Receiver<bool>,
    after: Duration,
}

impl Watchdog {
    /// Start the timer. When it expires the renderer is shut down if it is
    /// still alive.
    pub fn arm(target: Weak<dyn Renderer>, after: Duration) -> Self {
        let (tx, fired) = watch::channel(false);
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tracing::warn!(
                timeout_ms = after.as_millis() as u64,
                "Watchdog timeout reached, closing browser"
            );
            match target.upgrade() {
                Some(renderer) => {
                    if let Err(e) = renderer.shutdown().await {
                        tracing::warn!("Watchdog failed to close browser: {e:#}");
                    }
                }
                None => tracing::debug!("Browser already released"),
            }
            let _ = tx.send(true);
        });
        Self { task, fired, after }
    }

    /// Resolves once the watchdog has fired. Never resolves if it is disarmed
    /// first.
    pub async fn expired(&self) {
        let mut fired = self.fired.clone();
        let disarmed = fired.wait_for(|f| *f).await.is_err();
        if disarmed {
            std::future::pending::<()>().await;
        }
    }

    pub fn has_fired(&self) -> bool {
        *self.fired.borrow()
    }

    pub fn timeout(&self) -> Duration {
        self.after
    }

    /// Stop the timer if it has not fired yet.
    pub fn disarm(self) {
        self.task.abort();
    }
}
