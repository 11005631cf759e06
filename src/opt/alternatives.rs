//! Alternatives groups: collapse and flatten.
//!
//! An alternatives group holds N candidate region bodies plus a parallel list
//! of human-readable descriptions. A group with one candidate is no choice at
//! all and is spliced inline. A group nested inside another group's candidate
//! is flattened into the parent, multiplying that candidate by the inner
//! choices; flattening only runs on outermost groups so one sweep does not
//! explode the search space quadratically.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::{
    error::Result,
    ir::{Attributes, Module, OpId, OpKind, RegionId},
    rewrite::{PatternSet, RewritePattern},
};

pub fn register(set: &mut PatternSet) {
    set.add(CollapseSingleCandidate);
    set.add(FlattenNested);
}

/// Splices the body of a one-candidate group into the enclosing region.
struct CollapseSingleCandidate;

impl RewritePattern for CollapseSingleCandidate {
    fn name(&self) -> &'static str {
        "collapse-single-candidate"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::Alternatives)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        if data.regions().len() != 1 {
            return Ok(false);
        }
        let region = data.regions()[0];
        debug_assert_eq!(data.num_results(), 0, "alternatives groups produce no results");

        let ops = module.region(region).ops().to_vec();
        for child in ops {
            if module.op(child).kind.traits().is_terminator {
                continue;
            }
            module.detach_op(child);
            module.insert_before(op, child);
        }
        module.erase_op(op);
        Ok(true)
    }
}

/// Flattens a group nested in another group's candidate into the parent.
///
/// With outer candidates `[x, y]` and an inner group `[1, 2, 3]` inside `x`,
/// the result is one group with candidates `[x1, x2, x3, y]`: the hosting
/// candidate is replicated once per inner choice with the inner body spliced
/// at the nesting point, and every other candidate is carried over unchanged.
/// Descriptions concatenate pairwise in the same order.
struct FlattenNested;

impl RewritePattern for FlattenNested {
    fn name(&self) -> &'static str {
        "flatten-nested-alternatives"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::Alternatives)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        // Only the outermost group flattens; nested ones are reached once
        // their ancestors have been processed.
        if module.has_ancestor_of_kind(op, |k| matches!(k, OpKind::Alternatives)) {
            return Ok(false);
        }

        let outer_regions = module.op(op).regions().to_vec();
        let mut found: Option<(usize, OpId)> = None;
        'search: for (k, &region) in outer_regions.iter().enumerate() {
            for &child in module.region(region).ops() {
                if matches!(module.op(child).kind, OpKind::Alternatives) {
                    found = Some((k, child));
                    break 'search;
                }
            }
        }
        let Some((host_idx, inner)) = found else { return Ok(false) };

        let outer_descs: Vec<SmolStr> = module.op(op).alternative_descs().to_vec();
        let inner_descs: Vec<SmolStr> = module.op(inner).alternative_descs().to_vec();
        let inner_regions = module.op(inner).regions().to_vec();
        if outer_descs.len() != outer_regions.len() || inner_descs.len() != inner_regions.len() {
            return Ok(false);
        }

        let mut new_regions: Vec<RegionId> = Vec::new();
        let mut descs: Vec<SmolStr> = Vec::new();

        // The hosting candidate multiplied by each inner choice.
        let host_ops = module.region(outer_regions[host_idx]).ops().to_vec();
        for (m, &inner_region) in inner_regions.iter().enumerate() {
            let dest = module.create_region([]);
            let mut map = HashMap::new();
            for &child in &host_ops {
                if child == inner {
                    let spliced = module.region(inner_region).ops().to_vec();
                    for grandchild in spliced {
                        if module.op(grandchild).kind.traits().is_terminator {
                            continue;
                        }
                        module.clone_op_into(grandchild, dest, &mut map);
                    }
                } else if !module.op(child).kind.traits().is_terminator {
                    module.clone_op_into(child, dest, &mut map);
                }
            }
            finish(module, dest);
            new_regions.push(dest);
            descs.push(concat(&outer_descs[host_idx], &inner_descs[m]));
        }

        // Remaining candidates carry over as-is.
        for (k, &region) in outer_regions.iter().enumerate() {
            if k == host_idx {
                continue;
            }
            let dest = module.create_region([]);
            let mut map = HashMap::new();
            let children = module.region(region).ops().to_vec();
            for child in children {
                if module.op(child).kind.traits().is_terminator {
                    continue;
                }
                module.clone_op_into(child, dest, &mut map);
            }
            finish(module, dest);
            new_regions.push(dest);
            descs.push(outer_descs[k].clone());
        }

        let attrs = module.op(op).attrs.clone();
        let new_op = module.create_op(OpKind::Alternatives, &[], &[], &new_regions, attrs);
        module
            .op_mut(new_op)
            .attrs
            .set(crate::ir::keys::ALTERNATIVE_DESCS, crate::ir::Attribute::StrList(descs));
        module.insert_before(op, new_op);
        module.erase_op(op);
        log::debug!(
            "flattened nested alternatives into {} candidates",
            new_regions.len()
        );
        Ok(true)
    }
}

fn finish(module: &mut Module, region: RegionId) {
    let term = module.create_op(OpKind::Yield, &[], &[], &[], Attributes::new());
    module.push_op(region, term);
}

fn concat(a: &SmolStr, b: &SmolStr) -> SmolStr {
    SmolStr::from(format!("{a}{b}"))
}
