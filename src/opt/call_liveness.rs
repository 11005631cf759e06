//! Call-site liveness optimization for launch operations.
//!
//! Launch operations (`kernel_call`, `jit_call`) return their mutable
//! operands as results, with an aliasing descriptor per result. Two rewrites
//! exploit callee-side liveness facts from the symbol table: results aliasing
//! parameters the callee never mutates are forwarded to the operand, and
//! parameters with no use inside the callee are removed from the signature
//! and every call site at once.
//!
//! Symbol resolution is mandatory here: a launch whose callee is missing
//! aborts the run instead of being skipped, since skipping would silently
//! drop the optimization a caller asked for.

use smallvec::SmallVec;

use crate::{
    error::{Error, Result},
    ir::{Module, OpId, OpKind, ResultAlias, ValueId, reindex_after_removal},
    rewrite::{PatternSet, RewritePattern},
};

pub fn register(set: &mut PatternSet) {
    set.add(ElideReadOnlyResults);
    set.add(EliminateDeadArgs);
}

/// A result that aliases an operand the callee never mutates is just that
/// operand; forward it and shrink the launch's result list.
struct ElideReadOnlyResults;

impl RewritePattern for ElideReadOnlyResults {
    fn name(&self) -> &'static str {
        "elide-readonly-results"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        kind.is_launch()
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        let Some(callee) = data.callee().cloned() else { return Ok(false) };
        let num_results = data.num_results();
        let num_operands = data.num_operands();
        let aliases: Vec<ResultAlias> = data.output_aliases().to_vec();

        let info = module.symbols.resolve(&callee)?;

        if aliases.len() != num_results {
            log::warn!(
                "launch of `{callee}` carries {} aliases for {num_results} results; skipping",
                aliases.len()
            );
            return Ok(false);
        }

        // Decide per result whether it can be forwarded. Everything is
        // validated before the first mutation.
        let mut forwarded: SmallVec<[Option<ValueId>; 4]> = SmallVec::new();
        let mut dropped_any = false;
        for (idx, alias) in aliases.iter().enumerate() {
            let Some(oi) = alias.operand_index else {
                forwarded.push(None);
                continue;
            };
            let oi = oi as usize;
            if oi >= num_operands {
                // Ill-formed aliasing: fail closed for this launch.
                return Ok(false);
            }
            let Some(param) = info.params.get(oi) else { return Ok(false) };
            if !param.never_mutated() {
                forwarded.push(None);
                continue;
            }
            let operand = module.op(op).operands()[oi];
            if module.value_type(operand) != module.op(op).result_types[idx] {
                forwarded.push(None);
                continue;
            }
            forwarded.push(Some(operand));
            dropped_any = true;
        }
        if !dropped_any {
            return Ok(false);
        }

        let data = module.op(op);
        let kind = data.kind.clone();
        let operands: Vec<ValueId> = data.operands().to_vec();
        let attrs = data.attrs.clone();

        let mut kept_types = Vec::new();
        let mut kept_aliases = Vec::new();
        for (idx, alias) in aliases.iter().enumerate() {
            if forwarded[idx].is_some() {
                continue;
            }
            kept_types.push(module.op(op).result_types[idx].clone());
            kept_aliases.push(*alias);
        }
        // Single-result descriptors use the implicit output encoding.
        let kept_count = kept_aliases.len() as u32;
        for (out_idx, alias) in kept_aliases.iter_mut().enumerate() {
            alias.output_index = (kept_count != 1).then_some(out_idx as u32);
        }

        let new_op = module.create_op(kind, &operands, &kept_types, &[], attrs);
        module.op_mut(new_op).set_output_aliases(kept_aliases);
        module.insert_before(op, new_op);

        let mut replacements = Vec::with_capacity(num_results);
        let mut next = 0u32;
        for fwd in &forwarded {
            match fwd {
                Some(operand) => replacements.push(*operand),
                None => {
                    replacements.push(ValueId::result(new_op, next));
                    next += 1;
                }
            }
        }
        module.replace_op(op, &replacements);
        log::debug!(
            "forwarded {} read-only results of `{callee}`",
            num_results - kept_types.len()
        );
        Ok(true)
    }
}

/// Remove callee parameters with no use inside the callee body, updating the
/// signature and every launch of that callee in one step. If any alias at any
/// call site names a dead parameter the whole elimination is abandoned; a
/// launch of the callee through a different operation kind makes the use set
/// unclassifiable and aborts the run.
struct EliminateDeadArgs;

impl RewritePattern for EliminateDeadArgs {
    fn name(&self) -> &'static str {
        "eliminate-dead-args"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        kind.is_launch()
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let Some(callee) = module.op(op).callee().cloned() else { return Ok(false) };
        let own_kind = module.op(op).kind.clone();
        let info = module.symbols.resolve(&callee)?;

        let dead: Vec<u32> = info
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.used)
            .map(|(i, _)| i as u32)
            .collect();
        if dead.is_empty() {
            return Ok(false);
        }
        let param_count = info.params.len();

        // Gather every use of the symbol, call or not. All of them must
        // launch through the same operation kind, or the callee's uses
        // cannot be classified and the signature must stay untouched.
        let mut sites = Vec::new();
        for candidate in module.walk_ops() {
            let data = module.op(candidate);
            if data.callee().is_none_or(|name| *name != callee) {
                continue;
            }
            if data.kind != own_kind {
                return Err(Error::UnclassifiedCallUse { name: callee.clone() });
            }
            if data.num_operands() != param_count {
                return Ok(false);
            }
            // A dead parameter named by any aliasing descriptor keeps the
            // whole signature intact: fail closed, never partially.
            for alias in data.output_aliases() {
                let Some(oi) = alias.operand_index else { continue };
                if oi as usize >= param_count {
                    return Ok(false);
                }
                if dead.contains(&oi) {
                    return Ok(false);
                }
            }
            sites.push(candidate);
        }

        // Commit: signature first, then every call site.
        let info = module.symbols.resolve_mut(&callee)?;
        let mut keep = 0usize;
        let mut index = 0u32;
        info.params.retain(|_| {
            let kept = !dead.contains(&index);
            index += 1;
            keep += usize::from(kept);
            kept
        });
        debug_assert_eq!(keep, param_count - dead.len());

        for site in sites {
            let kept_operands: Vec<ValueId> = module
                .op(site)
                .operands()
                .iter()
                .enumerate()
                .filter(|(i, _)| !dead.contains(&(*i as u32)))
                .map(|(_, &v)| v)
                .collect();
            module.set_operands(site, &kept_operands);

            let mut aliases = module.op(site).output_aliases().to_vec();
            for alias in &mut aliases {
                if let Some(oi) = alias.operand_index {
                    alias.operand_index = Some(reindex_after_removal(oi, &dead));
                }
            }
            module.op_mut(site).set_output_aliases(aliases);
        }
        log::debug!("removed {} dead parameters from `{callee}`", dead.len());
        Ok(true)
    }
}
