//! Terraform provider for Google Cloud Platform
//!
//! Resources are thin bindings over the GCP REST APIs: each one describes how its
//! Terraform attributes map onto an API object, and a generic lifecycle drives the
//! HTTP calls, long-running operations and state bookkeeping.

pub mod config;
pub mod iam;
pub mod operation;
pub mod provider;
pub mod rest;
pub mod services;
pub mod tpgresource;
pub mod transport;

pub use config::{Config, ConfigHandle};
pub use provider::GoogleProvider;
