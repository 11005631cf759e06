//! Generic match/apply machinery: patterns and the fixed-point driver.

mod driver;
mod pattern;

pub use self::{
    driver::{RewriteConfig, RewriteStats, run_to_fixed_point},
    pattern::{PatternSet, RewritePattern},
};
