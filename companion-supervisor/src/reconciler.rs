//! Fixed-period reconciliation of observed container state toward desired.
//!
//! Every tick walks the registry in name order. Per service:
//! 1. query the runtime for the container's state (no container: Stopped)
//! 2. fold the observation into the record ([`Service::reconcile`])
//! 3. carry out the resulting start or stop, outside the record lock
//!
//! A runtime error for one service is logged and the tick moves on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::runtime::{ObservedState, RuntimeError};
use crate::service::{Action, MAX_CONSECUTIVE_FAILED_STARTS, Service};
use crate::supervisor::Supervisor;

/// Time between two reconcile passes.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Marker published after every completed tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceTick {
    pub sequence: u64,
    pub finished_at: DateTime<Utc>,
}

pub struct Reconciler {
    supervisor: Arc<Supervisor>,
    period: Duration,
}

impl Reconciler {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            period: TICK_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run one pass over every service and publish its tick marker.
    pub async fn reconcile_once(&self) -> MaintenanceTick {
        for (name, record) in self.supervisor.records() {
            if let Err(e) = self.reconcile_service(name, record).await {
                error!(service = %name, error = %e, "Reconcile failed");
            }
        }

        let sequence = self
            .supervisor
            .last_tick()
            .map_or(1, |tick| tick.sequence + 1);
        let tick = MaintenanceTick {
            sequence,
            finished_at: Utc::now(),
        };
        self.supervisor.ticks().send_replace(Some(tick.clone()));
        tick
    }

    async fn reconcile_service(&self, name: &str, record: &Mutex<Service>) -> Result<(), RuntimeError> {
        let supervisor = &self.supervisor;
        let runtime = supervisor.runtime();

        let container = record.lock().await.container().cloned();
        let observed = match &container {
            Some(container) => {
                supervisor
                    .bounded(format!("status {name}"), runtime.status(container))
                    .await?
            }
            None => ObservedState::Stopped,
        };

        let outcome = record.lock().await.reconcile(observed);

        if outcome.auto_disabled {
            warn!(
                service = %name,
                threshold = MAX_CONSECUTIVE_FAILED_STARTS,
                "Service failed to start too often, disabling it"
            );
            supervisor.persist().await;
        }

        match outcome.action {
            Some(Action::Start(spec)) => {
                debug!(service = %name, image = %spec.image_ref(), "Starting service");
                let container = supervisor
                    .bounded(format!("start {name}"), runtime.start(&spec))
                    .await?;
                record.lock().await.set_container(container);
            }
            Some(Action::Stop(container)) => {
                supervisor
                    .bounded(format!("stop {name}"), runtime.stop(&container))
                    .await?;
                info!(service = %name, container = %container, "Service stopped");
            }
            None => {}
        }

        Ok(())
    }

    /// Tick until `shutdown` turns true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period = ?self.period, "Reconcile loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tick = self.reconcile_once().await;
                    debug!(sequence = tick.sequence, "Maintenance tick done");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconcile loop stopping");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
