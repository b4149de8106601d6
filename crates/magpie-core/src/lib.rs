//! Magpie Core - domain model and ports for the Magpie sync system.

mod error;
pub mod memory;
mod ports;
mod types;

pub use error::{Error, Result};
pub use ports::*;
pub use types::*;
