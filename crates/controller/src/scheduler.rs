use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Re-arming single-shot timer.
///
/// `schedule_after` waits one interval, runs the tick to completion, then
/// waits again. The next wait only starts once the tick resolves, so ticks
/// never overlap. Cancelling stops any wait that has not fired yet; a tick
/// that is already running finishes on its own.
#[derive(Debug, Default)]
pub struct TickScheduler {
    pending: Option<CancellationToken>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previously scheduled loop.
    pub fn schedule_after<F, Fut>(&mut self, interval: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        self.cancel_pending();

        let token = CancellationToken::new();
        let task_token = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if tick().await.is_break() {
                    break;
                }
            }
            task_token.cancel();
        });

        self.pending = Some(token);
    }

    /// Returns true if a loop was running.
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(token) => {
                let was_running = !token.is_cancelled();
                token.cancel();
                was_running
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
