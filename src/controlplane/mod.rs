//! Control Plane Module
//!
//! The reconciling orchestrator and the adapters it drives: releases are
//! installed through a release manager, observed through a cluster status
//! provider and remembered in the catalog.

pub mod api;
pub mod cluster;
pub mod manifest;
pub mod orchestrator;
pub mod refresh;
pub mod release;

#[cfg(test)]
pub(crate) mod testing;

pub use api::*;
pub use orchestrator::*;
pub use refresh::{RefreshReport, Refresher};
