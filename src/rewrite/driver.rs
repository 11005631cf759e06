//! Fixed-point driver.
//!
//! Repeatedly sweeps the graph in pre-order; for every operation the
//! applicable patterns are tried in registration order. The first successful
//! application ends the sweep (topology changed) and a fresh sweep starts
//! from the root. A graph is at fixed point when one full sweep applies
//! nothing. The application cap is a safety valve, not a correctness
//! mechanism: hitting it stops iteration without failing, but is logged and
//! reported through [`RewriteStats`] so non-convergence stays observable.

use crate::{error::Result, ir::Module};

use super::pattern::PatternSet;

#[derive(Debug, Clone, Copy)]
pub struct RewriteConfig {
    /// Upper bound on successful pattern applications per run.
    pub max_applications: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self { max_applications: 4096 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub applications: usize,
    pub sweeps: usize,
    /// False when the application cap cut iteration short.
    pub converged: bool,
}

pub fn run_to_fixed_point(
    module: &mut Module,
    patterns: &PatternSet,
    config: &RewriteConfig,
) -> Result<RewriteStats> {
    let mut stats = RewriteStats::default();

    'sweeps: loop {
        stats.sweeps += 1;
        let snapshot = module.walk_ops();

        for op in snapshot {
            for pattern in patterns.iter() {
                if !pattern.matches_kind(&module.op(op).kind) {
                    continue;
                }
                if pattern.match_and_rewrite(op, module)? {
                    log::trace!("applied `{}` in module `{}`", pattern.name(), module.name);
                    stats.applications += 1;
                    if stats.applications >= config.max_applications {
                        log::warn!(
                            "rewrite budget ({}) exhausted in module `{}` without reaching a \
                             fixed point",
                            config.max_applications,
                            module.name
                        );
                        return Ok(stats);
                    }
                    // Topology changed: restart matching from the root.
                    continue 'sweeps;
                }
            }
        }

        stats.converged = true;
        log::debug!(
            "module `{}` reached fixed point after {} applications ({} sweeps)",
            module.name,
            stats.applications,
            stats.sweeps
        );
        return Ok(stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Attributes, ConstValue, OpId, OpKind, ValueId},
        rewrite::RewritePattern,
        typing::Type,
    };

    /// Folds `add(c, c)` of two index constants into one constant.
    struct FoldConstAdd;

    impl RewritePattern for FoldConstAdd {
        fn name(&self) -> &'static str {
            "fold-const-add"
        }
        fn matches_kind(&self, kind: &OpKind) -> bool {
            matches!(kind, OpKind::Add)
        }
        fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
            let (Some(lhs), Some(rhs)) = (module.op(op).operand(0), module.op(op).operand(1))
            else {
                return Ok(false);
            };
            let (Some(a), Some(b)) = (module.const_int(lhs), module.const_int(rhs)) else {
                return Ok(false);
            };
            let cst = module.insert_new_before(
                op,
                OpKind::Constant(ConstValue::Index(a + b)),
                &[],
                &[Type::Index],
            );
            module.replace_op(op, &[ValueId::result(cst, 0)]);
            Ok(true)
        }
    }

    fn build_chain(module: &mut Module, leaves: &[i64]) -> OpId {
        let body = module.body();
        let mut prev: Option<ValueId> = None;
        let mut last = None;
        for &v in leaves {
            let c = module.create_op(
                OpKind::Constant(ConstValue::Index(v)),
                &[],
                &[Type::Index],
                &[],
                Attributes::new(),
            );
            module.push_op(body, c);
            let cv = ValueId::result(c, 0);
            prev = Some(match prev {
                None => cv,
                Some(acc) => {
                    let add = module.create_op(
                        OpKind::Add,
                        &[acc, cv],
                        &[Type::Index],
                        &[],
                        Attributes::new(),
                    );
                    module.push_op(body, add);
                    last = Some(add);
                    ValueId::result(add, 0)
                }
            });
        }
        last.unwrap()
    }

    #[test]
    fn reaches_fixed_point_and_is_idempotent() {
        let mut module = Module::new("driver_test");
        build_chain(&mut module, &[1, 2, 3, 4]);

        let mut patterns = PatternSet::new();
        patterns.add(FoldConstAdd);

        let stats =
            run_to_fixed_point(&mut module, &patterns, &RewriteConfig::default()).unwrap();
        assert!(stats.converged);
        assert_eq!(stats.applications, 3);

        let printed = crate::ir::print_module(&module);
        // Re-running on a fixed-point graph must not change anything.
        let stats2 =
            run_to_fixed_point(&mut module, &patterns, &RewriteConfig::default()).unwrap();
        assert!(stats2.converged);
        assert_eq!(stats2.applications, 0);
        assert_eq!(crate::ir::print_module(&module), printed);
    }

    #[test]
    fn budget_exhaustion_is_observable_not_fatal() {
        let mut module = Module::new("budget_test");
        build_chain(&mut module, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut patterns = PatternSet::new();
        patterns.add(FoldConstAdd);

        let stats = run_to_fixed_point(
            &mut module,
            &patterns,
            &RewriteConfig { max_applications: 2 },
        )
        .unwrap();
        assert!(!stats.converged);
        assert_eq!(stats.applications, 2);
    }
}
