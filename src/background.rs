use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::Result;

/// Drives one periodic background job until the shutdown flag flips.
///
/// Each wake runs `tick`; a failed tick is logged and followed by `backoff`
/// instead of `interval`. Errors never leave the loop.
pub(crate) async fn run_loop<F>(
    name: &'static str,
    interval: Duration,
    backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Result<()> + Send + 'static,
{
    info!(task = name, interval_secs = interval.as_secs_f64(), "background loop started");
    let mut wait = interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                // A dropped sender also means the monitor is gone
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        wait = match tick() {
            Ok(()) => {
                debug!(task = name, "background tick complete");
                interval
            }
            Err(e) => {
                error!(
                    task = name,
                    error = %e,
                    backoff_secs = backoff.as_secs_f64(),
                    "background tick failed, backing off"
                );
                backoff
            }
        };
    }

    info!(task = name, "background loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_and_loop_continues() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let handle = tokio::spawn(run_loop(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(10),
            rx,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(MonitorError::Internal("first tick fails".into()))
                } else {
                    Ok(())
                }
            },
        ));

        // t=1 first tick fails, next tick waits for the backoff at t=11
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tx.send_replace(true);
        handle.await.unwrap();
    }
}
