//! Restartable one-shot timer.
//!
//! Every `arm` supersedes the previous one; the callback runs once, after
//! the last `arm`'s delay passes with no further `arm` or `cancel`. The
//! callback receives the ticket of the arm that fired it, so a consumer
//! holding a queued expiry can tell whether it is still current.
//!
//! Timers run on the runtime whose handle the debouncer was built with, so
//! `arm` and `cancel` may be called from any thread.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type Callback = Arc<dyn Fn(u64) + Send + Sync>;

pub struct Debouncer {
    runtime: Handle,
    callback: Callback,
    pending: Option<JoinHandle<()>>,
    ticket: u64,
}

impl Debouncer {
    pub fn new(runtime: Handle, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            runtime,
            callback: Arc::new(callback),
            pending: None,
            ticket: 0,
        }
    }

    /// (Re)start the timer. Returns the ticket the callback will receive.
    pub fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        let ticket = self.ticket;
        let callback = Arc::clone(&self.callback);
        self.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback(ticket);
        }));
        ticket
    }

    /// Stop a pending timer without running the callback.
    ///
    /// Also retires the current ticket, so an expiry that already fired but
    /// has not been consumed is recognisably stale.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.ticket += 1;
    }

    /// Whether `ticket` belongs to the most recent, uncancelled arm.
    pub fn is_current(&self, ticket: u64) -> bool {
        self.pending.is_some() && ticket == self.ticket
    }

    /// Mark the current arm as consumed.
    pub fn settle(&mut self) {
        self.pending = None;
        self.ticket += 1;
    }

    /// Armed and not yet consumed by [`settle`](Self::settle) or [`cancel`](Self::cancel).
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("ticket", &self.ticket)
            .field("pending", &self.is_pending())
            .finish()
    }
}
