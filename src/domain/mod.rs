//! Domain layer - Placement data model and port definitions
//!
//! This module defines the shared placement types and the traits (ports)
//! that adapters implement, following hexagonal architecture principles.

pub mod model;
pub mod ports;

pub use model::*;
pub use ports::*;
