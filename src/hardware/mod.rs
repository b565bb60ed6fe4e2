//! Hardware Module
//!
//! Block device enumeration, command execution and the eligibility probes
//! the device planner relies on.

pub mod executor;
pub mod probe;
pub mod scanner;

pub use executor::*;
pub use probe::*;
pub use scanner::*;
