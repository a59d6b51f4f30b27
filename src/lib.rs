//! Call-graph extraction and flowchart rendering for smart-contract sources.

pub mod config;
pub mod core;
pub mod error;

pub use config::Config;
pub use crate::core::Engine;
pub use error::{ContractScopeError, Result};
