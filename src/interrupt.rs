use std::future::Future;

use tracing::{error, warn};

use ranger_timing::CancelToken;

/// Resolves on the second interrupt.
///
/// The first interrupt cancels `cancel` so sampling stops between samples.
/// A sampling thread stuck on a silent echo line never reaches that check,
/// so the second interrupt is the caller's cue to abort outright.
pub async fn wait_for_abort<F, Fut>(cancel: CancelToken, mut interrupt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    next_interrupt(&mut interrupt).await;
    warn!("Interrupt received, stopping after the current sample. Interrupt again to abort.");
    cancel.cancel();
    next_interrupt(&mut interrupt).await;
    error!("Second interrupt received, abandoning the sampling thread.");
}

async fn next_interrupt<F, Fut>(interrupt: &mut F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = interrupt().await {
        warn!(error = %e, "Cannot listen for interrupts.");
        std::future::pending::<()>().await;
    }
}
