use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config;
use crate::error::DisplayError;
use crate::events::WakeReason;
use crate::scheduler::Shared;

pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    info!("refresh loop running");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        // Read every iteration so interval edits apply without a restart.
        let interval = config::refresh_interval(&*shared.config);

        let tick = {
            let shared = Arc::clone(&shared);
            tokio::task::spawn_blocking(move || shared.refresh_cycle())
        };
        let result = match tick.await {
            Ok(result) => result,
            Err(err) => Err(DisplayError::Job(err.to_string())),
        };

        match result {
            Ok(outcome) => debug!(
                ?outcome,
                next_in = %humantime::format_duration(interval),
                "refresh tick complete"
            ),
            Err(err) => {
                let backoff = config::error_backoff(&*shared.config);
                error!(
                    backoff = %humantime::format_duration(backoff),
                    "refresh tick failed: {err}"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep(backoff) => continue,
                }
            }
        }

        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.wake.notified() => WakeReason::Trigger,
            _ = sleep(interval) => WakeReason::Timer,
        };
        debug!(%reason, "refresh loop woke");
    }
    info!("cancel received; refresh loop exiting");
}
