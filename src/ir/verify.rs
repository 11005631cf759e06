//! Structural verification of front-end invariants.
//!
//! The optimizer assumes attributes are well-formed on entry; this check
//! makes that contract explicit for graphs arriving from outside, so a bad
//! producer fails loudly here instead of as a skipped rewrite deep in a pass.

use crate::error::{Error, Result};

use super::{module::Module, op::OpId};

/// Check every launch operation's aliasing descriptors: one descriptor per
/// result, operand indices in bounds, and the single-result encoding only on
/// single-result operations.
pub fn verify_module(module: &Module) -> Result<()> {
    for op in module.walk_ops() {
        verify_op(module, op)?;
    }
    Ok(())
}

fn verify_op(module: &Module, op: OpId) -> Result<()> {
    let data = module.op(op);
    if !data.kind.traits().has_aliasing {
        return Ok(());
    }
    let callee = data.callee().cloned().unwrap_or_default();
    let Some(aliases) = data.attrs.aliases() else { return Ok(()) };

    if aliases.len() != data.num_results() {
        return Err(Error::AliasArityMismatch {
            callee,
            aliases: aliases.len(),
            results: data.num_results(),
        });
    }
    for alias in aliases {
        if let Some(oi) = alias.operand_index {
            if oi as usize >= data.num_operands() {
                return Err(Error::IllFormedAliasing {
                    callee: callee.clone(),
                    operand_index: oi,
                    operand_count: data.num_operands(),
                });
            }
        }
        if alias.output_index.is_none() && data.num_results() != 1 {
            return Err(Error::AliasArityMismatch {
                callee: callee.clone(),
                aliases: aliases.len(),
                results: data.num_results(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Attribute, Attributes, OpKind, ResultAlias, ValueId, keys},
        typing::Type,
    };

    fn launch(module: &mut Module, operands: &[ValueId], results: usize, aliases: Vec<ResultAlias>) {
        let mut attrs = Attributes::new();
        attrs.set(keys::CALLEE, Attribute::Symbol("kern".into()));
        attrs.set(keys::OUTPUT_ALIASES, Attribute::Aliases(aliases));
        let body = module.body();
        let tys = vec![Type::Index; results];
        let op = module.create_op(OpKind::KernelCall, operands, &tys, &[], attrs);
        module.push_op(body, op);
    }

    fn value(module: &mut Module) -> ValueId {
        let body = module.body();
        let op = module.create_op(
            OpKind::Opaque("v".into()),
            &[],
            &[Type::Index],
            &[],
            Attributes::new(),
        );
        module.push_op(body, op);
        ValueId::result(op, 0)
    }

    #[test]
    fn well_formed_launch_passes() {
        let mut module = Module::new("ok");
        let a = value(&mut module);
        launch(&mut module, &[a], 1, vec![ResultAlias::aliasing(None, 0)]);
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let mut module = Module::new("arity");
        let a = value(&mut module);
        launch(&mut module, &[a], 2, vec![ResultAlias::aliasing(Some(0), 0)]);
        assert!(matches!(
            verify_module(&module),
            Err(Error::AliasArityMismatch { aliases: 1, results: 2, .. })
        ));
    }

    #[test]
    fn out_of_bounds_operand_is_reported() {
        let mut module = Module::new("oob");
        let a = value(&mut module);
        launch(&mut module, &[a], 1, vec![ResultAlias::aliasing(None, 5)]);
        assert!(matches!(
            verify_module(&module),
            Err(Error::IllFormedAliasing { operand_index: 5, operand_count: 1, .. })
        ));
    }
}
