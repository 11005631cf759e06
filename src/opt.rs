//! Optimization passes over the IR graph.
//!
//! The canonical pipeline registers every local rewrite into one pattern set
//! and drives it to a fixed point: view-conversion canonicalization, call-site
//! liveness, alternatives restructuring and (optionally) barrier motion all
//! interleave, so a simplification from one family exposes matches for the
//! others within the same run.

pub mod alternatives;
pub mod barrier;
pub mod call_liveness;
pub mod view_canon;

use crate::{
    error::Result,
    ir::Module,
    rewrite::{PatternSet, RewriteConfig, RewriteStats, run_to_fixed_point},
};

#[derive(Debug, Clone, Copy)]
pub struct PassConfig {
    /// Register barrier motion. Off means barriers stay exactly where the
    /// front end placed them.
    pub barrier_motion: bool,
    pub rewrite: RewriteConfig,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self { barrier_motion: true, rewrite: RewriteConfig::default() }
    }
}

/// Run the full local-rewrite pipeline on one module.
pub fn optimize_module(module: &mut Module, config: &PassConfig) -> Result<RewriteStats> {
    let mut set = PatternSet::new();
    view_canon::register(&mut set);
    call_liveness::register(&mut set);
    alternatives::register(&mut set);
    if config.barrier_motion {
        barrier::register(&mut set);
    }
    log::debug!(
        "optimizing module `{}` with {} patterns (barrier motion: {})",
        module.name,
        set.len(),
        config.barrier_motion
    );
    run_to_fixed_point(module, &set, &config.rewrite)
}
