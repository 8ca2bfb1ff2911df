//! Core domain types and traits for stackconf.
//!
//! This crate contains:
//! - Resource references and host drafts sent to the inventory service
//! - DNS record intents and the DNS service trait
//! - The inventory service trait
//! - Subprocess types and the command runner trait
//! - Puppet run outcome classification

pub mod dns;
pub mod error;
pub mod host;
pub mod inventory;
pub mod process;
pub mod puppet;
pub mod resource;

pub use error::{Error, Result};
pub use resource::{ResourceKind, ResourceRef};
