//! Deadline governor: hard wall-clock bound for work with no native
//! cancellation hook.
//!
//! The wrapped future runs on its own task; on timeout the caller stops
//! waiting and gets [`Governed::TimedOut`] back. Known limitation, kept
//! deliberately: abandoning the join handle does NOT stop the underlying
//! work — the upstream call typically cannot be interrupted mid-flight,
//! so the detached task may keep running (and holding its resources)
//! until it finishes on its own. Callers must not assume resource
//! release on timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of a governed unit of work.
#[derive(Debug)]
pub enum Governed<T> {
    Finished(T),
    /// The deadline passed first; the work was abandoned, not stopped.
    TimedOut,
}

impl<T> Governed<T> {
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Run `work` with a hard wall-clock limit.
pub async fn run_with_deadline<T, F>(limit: Duration, work: F) -> Governed<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(work);

    match timeout(limit, handle).await {
        Ok(Ok(value)) => Governed::Finished(value),
        Ok(Err(join_err)) => {
            // A panicked attempt yields no result either way.
            warn!(error = %join_err, "governed task failed to join");
            Governed::TimedOut
        }
        Err(_elapsed) => {
            debug!(?limit, "deadline reached, abandoning in-flight work");
            Governed::TimedOut
        }
    }
}
