// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reaper
//!
//! Tears down instances whose lease has run out. A sweep is triggered in the
//! background by every start and, optionally, on a fixed interval.
//!
//! Each network is judged on its own: a malformed label is logged and the
//! network skipped. The decision is re-checked under the tenant lock, so an
//! instance restarted after the listing is left alone.

use crate::application::orchestration::{OrchestrationError, PodOrchestrator};
use crate::domain::instance::{is_overdue, reap_deadline, LeaseHours, TenantId};
use crate::domain::runtime::RuntimeError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub reaped: Vec<String>,
    /// Networks skipped because of malformed labels.
    pub skipped: usize,
    /// Overdue instances whose teardown failed.
    pub failed: usize,
}

impl PodOrchestrator {
    /// Fire-and-forget sweep with the configured horizon.
    pub fn trigger_sweep(self: &Arc<Self>) {
        let orchestrator = Arc::clone(self);
        let horizon = self.config.reaper_horizon;
        tokio::spawn(async move {
            match orchestrator.sweep_overdue(horizon).await {
                Ok(report) if !report.reaped.is_empty() => {
                    info!(reaped = ?report.reaped, "Reaped overdue instances")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Background sweep failed"),
            }
        });
    }

    pub async fn sweep_overdue(&self, horizon: LeaseHours) -> Result<SweepReport, OrchestrationError> {
        self.sweep_overdue_at(Utc::now(), horizon).await
    }

    /// Sweep as if the current time were `now`.
    pub async fn sweep_overdue_at(
        &self,
        now: DateTime<Utc>,
        horizon: LeaseHours,
    ) -> Result<SweepReport, OrchestrationError> {
        let networks = self.runtime.list_networks().await?;
        let mut report = SweepReport {
            examined: networks.len(),
            ..Default::default()
        };

        for network in networks {
            match reap_deadline(&network.labels, horizon) {
                Ok(Some(deadline)) if is_overdue(deadline, now) => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(network = %network.name, error = %e, "Skipping network with malformed labels");
                    report.skipped += 1;
                    continue;
                }
            }

            let Ok(tenant) = TenantId::parse(&network.name) else {
                report.skipped += 1;
                continue;
            };

            match self.reap_if_overdue(&tenant, now, horizon).await {
                Ok(true) => report.reaped.push(network.name),
                Ok(false) => debug!(network = %network.name, "No longer overdue"),
                Err(e) => {
                    warn!(network = %network.name, error = %e, "Failed to reap instance");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn reap_if_overdue(
        &self,
        tenant: &TenantId,
        now: DateTime<Utc>,
        horizon: LeaseHours,
    ) -> Result<bool, OrchestrationError> {
        let _guard = self.locks.lock(tenant).await;

        let network = match self.runtime.inspect_network(tenant.network_name()).await {
            Ok(network) => network,
            Err(RuntimeError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match reap_deadline(&network.labels, horizon) {
            Ok(Some(deadline)) if is_overdue(deadline, now) => {
                self.stop_locked(tenant).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Sweep every `interval` until the returned handle is aborted.
    pub fn spawn_periodic_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let horizon = self.config.reaper_horizon;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match orchestrator.sweep_overdue(horizon).await {
                    Ok(report) => debug!(
                        examined = report.examined,
                        reaped = report.reaped.len(),
                        skipped = report.skipped,
                        "Periodic sweep finished"
                    ),
                    Err(e) => warn!(error = %e, "Periodic sweep failed"),
                }
            }
        })
    }
}
