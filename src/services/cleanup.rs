// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic purge of expired numeric codes and pending session records.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::PendingStateStore;
use crate::services::codes::CodeService;

/// Run one cleanup pass. Returns (codes deleted, pending records dropped).
pub async fn run_cleanup(codes: &CodeService, pending: &PendingStateStore) -> (usize, usize) {
    let deleted_codes = match codes.cleanup_expired().await {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "Code cleanup failed");
            0
        }
    };
    let dropped_pending = pending.cleanup_expired();

    if deleted_codes > 0 || dropped_pending > 0 {
        tracing::info!(
            codes = deleted_codes,
            pending = dropped_pending,
            "Expired records purged"
        );
    }
    (deleted_codes, dropped_pending)
}

/// Spawn the cleanup loop. A zero interval disables it.
pub fn spawn_cleanup(
    codes: CodeService,
    pending: PendingStateStore,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Code cleanup disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            run_cleanup(&codes, &pending).await;
        }
    }))
}
