//! Domain layer: entities, errors and provider ports.

pub mod error;
pub mod ports;
pub mod types;

pub use error::{Error, Result};
