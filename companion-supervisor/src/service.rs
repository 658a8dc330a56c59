//! Service record and its reconciliation state machine.
//!
//! A [`Service`] holds operator intent (desired state, version) and the last
//! observation of its container. [`Service::reconcile`] is the pure decision
//! step of one tick: it folds in a fresh observation and returns the action
//! the caller must carry out against the runtime, after releasing the lock.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::ServiceConfig;
use crate::runtime::{ContainerRef, ContainerSpec, ObservedState};

/// A service is auto-disabled once its failed-start counter exceeds this.
pub const MAX_CONSECUTIVE_FAILED_STARTS: u32 = 10;

/// Operator intent for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Enabled,
    Disabled,
}

/// Runtime action decided by one reconcile step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start(ContainerSpec),
    Stop(ContainerRef),
}

/// Outcome of folding an observation into a service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciled {
    pub action: Option<Action>,
    /// Set when this step tripped the failed-start threshold.
    pub auto_disabled: bool,
}

/// Status snapshot reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    pub desired: DesiredState,
    pub observed: ObservedState,
    pub consecutive_failed_starts: u32,
    pub image: String,
    pub version: String,
}

/// In-memory state of one managed workload.
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    config: ServiceConfig,
    desired: DesiredState,
    observed: ObservedState,
    consecutive_failed_starts: u32,
    container: Option<ContainerRef>,
}

impl Service {
    pub fn new(name: impl Into<String>, config: ServiceConfig) -> Self {
        let desired = if config.enabled {
            DesiredState::Enabled
        } else {
            DesiredState::Disabled
        };
        Self {
            name: name.into(),
            config,
            desired,
            observed: ObservedState::Stopped,
            consecutive_failed_starts: 0,
            container: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    pub fn observed(&self) -> ObservedState {
        self.observed
    }

    pub fn consecutive_failed_starts(&self) -> u32 {
        self.consecutive_failed_starts
    }

    pub fn image(&self) -> &str {
        &self.config.image
    }

    pub fn version(&self) -> &str {
        &self.config.tag
    }

    pub fn container(&self) -> Option<&ContainerRef> {
        self.container.as_ref()
    }

    /// Mark the service enabled. Returns `true` if this changed anything.
    ///
    /// Re-enabling a disabled service clears its failed-start counter, so an
    /// auto-disabled service gets a full budget again.
    pub fn enable(&mut self) -> bool {
        if self.desired == DesiredState::Enabled {
            return false;
        }
        self.desired = DesiredState::Enabled;
        self.consecutive_failed_starts = 0;
        true
    }

    /// Mark the service disabled. Returns `true` if this changed anything.
    pub fn disable(&mut self) -> bool {
        if self.desired == DesiredState::Disabled {
            return false;
        }
        self.desired = DesiredState::Disabled;
        true
    }

    /// Takes effect on the next (re)start only.
    pub fn set_version(&mut self, tag: impl Into<String>) {
        self.config.tag = tag.into();
    }

    /// Record the container handed out by a successful start.
    pub fn set_container(&mut self, container: ContainerRef) {
        self.container = Some(container);
    }

    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.name.clone(),
            image: self.config.image.clone(),
            tag: self.config.tag.clone(),
            options: self.config.options.clone(),
        }
    }

    /// Current settings, as they should be persisted.
    pub fn settings(&self) -> ServiceConfig {
        ServiceConfig {
            enabled: self.desired == DesiredState::Enabled,
            ..self.config.clone()
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            desired: self.desired,
            observed: self.observed,
            consecutive_failed_starts: self.consecutive_failed_starts,
            image: self.config.image.clone(),
            version: self.config.tag.clone(),
        }
    }

    /// Fold in a fresh observation and decide what to do about it.
    pub fn reconcile(&mut self, observed: ObservedState) -> Reconciled {
        self.observed = observed;

        match (self.desired, observed) {
            (DesiredState::Disabled, ObservedState::Stopped) => Reconciled::default(),
            (DesiredState::Disabled, _) => Reconciled {
                action: self.container.clone().map(Action::Stop),
                auto_disabled: false,
            },
            (DesiredState::Enabled, ObservedState::Running) => {
                self.consecutive_failed_starts = 0;
                Reconciled::default()
            }
            (DesiredState::Enabled, ObservedState::Starting) => Reconciled::default(),
            (DesiredState::Enabled, ObservedState::Stopped | ObservedState::Failed) => {
                self.consecutive_failed_starts += 1;
                let action = Some(Action::Start(self.container_spec()));

                let auto_disabled = self.consecutive_failed_starts > MAX_CONSECUTIVE_FAILED_STARTS;
                if auto_disabled {
                    self.desired = DesiredState::Disabled;
                }
                Reconciled {
                    action,
                    auto_disabled,
                }
            }
        }
    }
}
