//! Repeated invocation of the pipeline
//!
//! Each tick runs one complete, sequential job. A failing job is logged and the
//! loop carries on with the next tick.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::pipeline::RunReport;

/// Run `job` now and then every `every` until `shutdown` resolves.
/// A job in flight is never interrupted.
pub async fn run_every<F, Fut, S>(every: Duration, shutdown: S, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunReport>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Scheduling a run every {:?}", every);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, leaving scheduler");
                return;
            }
            _ = interval.tick() => {}
        }

        match job().await {
            Ok(report) => info!(
                "Scheduled run done: {} files, {} skipped",
                report.produced.len(),
                report.skipped.len()
            ),
            Err(e) => error!("Runtime Error Message: {:?}", e),
        }
    }
}
