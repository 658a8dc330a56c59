pub mod config;
pub mod error;
pub mod reconciler;
pub mod rest;
pub mod runtime;
pub mod service;
pub mod session;
pub mod supervisor;
pub mod versions;

pub use config::{ServiceConfig, Settings, SettingsStore};
pub use error::SupervisorError;
pub use reconciler::{MaintenanceTick, Reconciler, TICK_PERIOD};
pub use runtime::{ContainerRef, ContainerRuntime, ObservedState};
pub use service::{DesiredState, MAX_CONSECUTIVE_FAILED_STARTS, ServiceStatus};
pub use supervisor::Supervisor;
