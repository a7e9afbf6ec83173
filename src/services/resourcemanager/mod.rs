//! Cloud Resource Manager: project IAM and provider settings

mod client_config;
mod iam;

pub use client_config::{client_config_state, ClientConfigDataSource, ClientConfigState};
pub use iam::{ProjectIam, ProjectIamFields, ProjectIamUpdater};
