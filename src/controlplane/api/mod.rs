//! API Module
//!
//! REST surface of the operator: storage lifecycle, spec schema, status
//! and health endpoints.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
