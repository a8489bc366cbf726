//! # ats-client
//!
//! Client for the automation server's work distribution API.
//!
//! Pull work items off a work queue, process each inside a scope that
//! reports its outcome, and ship every `tracing` event to the session's
//! audit log tagged with the work item being processed.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod server;
pub mod telemetry;

pub use client::{Client, Workqueue};
pub use error::{Error, ProcessError, Result};
pub use server::AutomationServer;
