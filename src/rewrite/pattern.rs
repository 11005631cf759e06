//! Rewrite patterns: a predicate-and-transform pair scoped to operation kinds.

use crate::{
    error::Result,
    ir::{Module, OpId, OpKind},
};

/// One local rewrite rule.
///
/// `match_and_rewrite` returns `Ok(true)` when it applied, `Ok(false)` for
/// "no match" (including all recoverable precondition failures), and `Err`
/// only for conditions that must abort the whole run. A pattern must fully
/// validate its preconditions before mutating anything: there is no rollback.
pub trait RewritePattern {
    fn name(&self) -> &'static str;

    /// Cheap kind filter consulted before `match_and_rewrite`.
    fn matches_kind(&self, kind: &OpKind) -> bool;

    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool>;
}

/// Ordered pattern registry. Within one sweep, patterns are tried per
/// operation in registration order and the first match wins; this ordering is
/// what makes optimization output reproducible.
#[derive(Default)]
pub struct PatternSet {
    patterns: Vec<Box<dyn RewritePattern>>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: impl RewritePattern + 'static) -> &mut Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RewritePattern> {
        self.patterns.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
