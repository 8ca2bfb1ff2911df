//! Remote service clients for stackconf.
//!
//! Provides:
//! - Foreman inventory client
//! - PowerDNS client
//! - Jenkins job client
//! - MySQL record inserter
//! - Tokio-based local command runner

pub mod error;
pub mod foreman;
pub mod jenkins;
pub mod mysql;
pub mod powerdns;
pub mod runner;

pub use error::ClientError;
pub use foreman::ForemanClient;
pub use jenkins::JenkinsClient;
pub use mysql::{MySqlInserter, MySqlTarget};
pub use powerdns::PowerDnsClient;
pub use runner::TokioCommandRunner;
