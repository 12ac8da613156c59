//! Reconciliation engine for deployments managed through an asynchronous
//! catalog/request/resource provisioning service.
//!
//! The engine is transport-agnostic: it drives any [`api::ProvisioningClient`]
//! implementation. [`deployment`] covers the create, read and destroy flows,
//! [`reconcile`] closes the gap between two deployment snapshots through
//! day-2 actions, and [`request`] polls the asynchronous requests every flow
//! produces.

pub mod actions;
pub mod api;
pub mod config;
pub mod deployment;
pub mod error;
pub mod flatten;
pub mod reconcile;
pub mod request;
pub mod template;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
