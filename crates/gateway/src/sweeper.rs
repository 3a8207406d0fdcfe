use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::links::{LinkService, SweepReport};

/// Runs one reclamation pass and logs what it did
pub async fn sweep_once(links: &LinkService) -> Result<SweepReport> {
    let report = links.sweep().await?;
    if report.reclaimed > 0 {
        info!("Sweep reclaimed {} link(s)", report.reclaimed);
    } else {
        debug!("Sweep found nothing to reclaim");
    }
    if report.tombstones_pruned > 0 {
        debug!("Pruned {} tombstone(s)", report.tombstones_pruned);
    }
    Ok(report)
}

/// Background reclamation loop. Failures skip the run; the loop only ends when aborted.
pub fn spawn(links: Arc<LinkService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&links).await {
                warn!("Sweep skipped: {}", e);
            }
        }
    })
}
