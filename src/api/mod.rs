//! Public API surface.

pub mod config;
pub mod heap;
pub mod stats;
