//! Shared types

pub mod error;

pub use error::{GatehouseError, Result};
