//! Domain layer - Storage records and port definitions
//!
//! This module defines the record model and the core traits (ports) that
//! adapters implement, following hexagonal architecture principles.

pub mod ports;
pub mod record;

pub use ports::*;
pub use record::*;
