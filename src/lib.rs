//! LaunchDarkly provisioner: project/environment setup and workflow approval
//! reconciliation. The binary in `main.rs` is a thin CLI over these modules.

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod interrupt;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod provision;
pub mod reconcile;
pub mod wizard;
