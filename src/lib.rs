//! # Tessera-IR Rewrite Engine
//!
//! A local-rewrite optimization engine over a mutable, typed,
//! region-structured tensor-compiler IR: view-conversion canonicalization,
//! call-site liveness, barrier motion and alternatives flattening, driven to
//! a fixed point, plus the marshaling boundary toward an external
//! equality-saturation search service.

pub mod base;
pub mod error;
pub mod ir;
pub mod opt;
pub mod rewrite;
pub mod saturation;
pub mod typing;

pub use error::{Error, Result};
pub use opt::{PassConfig, optimize_module};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
