// Copyright (c) 2024 Botho Foundation

//! Periodic timeout sweep.

use super::service::RouteService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// Run [`RouteService::sweep`] every `sweep_interval` until the service is
/// dropped.
pub fn spawn(service: &Arc<RouteService>) -> JoinHandle<()> {
    let period = service.config().sweep_interval();
    let service = Arc::downgrade(service);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(service) = service.upgrade() else {
                debug!("Route service gone, sweeper stopping");
                break;
            };
            service.sweep(Instant::now());
        }
    })
}
