//! Provisioning and reconciliation pipelines for stackconf.
//!
//! This crate provides:
//! - The remote mutation client with its retry schedule
//! - The host provisioning pipeline (`create` and `delete`)
//! - The bulk environment reconciler (`deleteenv`)
//! - The Puppet agent run supervisor

pub mod context;
pub mod dns_records;
pub mod error;
pub mod extras;
pub mod provision;
pub mod reconcile;
pub mod retry;
pub mod supervisor;
pub mod whitelist;

#[cfg(test)]
mod testing;

pub use context::StackContext;
pub use error::{PipelineError, PipelineResult};
pub use provision::{HostIdentity, HostProvisioner, ProvisionReport};
pub use reconcile::{EnvironmentReconciler, ReconcileReport};
pub use retry::{MutationClient, MutationOp, RetryPolicy};
pub use supervisor::PuppetSupervisor;
pub use whitelist::{Whitelist, matches_environment};
