//! REST client for the provisioning service's catalog/request/resource API.
//!
//! [`Client`] implements [`stratus_core::api::ProvisioningClient`], so the
//! engine in `stratus-core` can drive a live service through it.

pub mod api;
pub mod client;

pub use client::{Client, ClientConfig};
