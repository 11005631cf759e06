//! Barrier motion.
//!
//! Moves synchronization barriers out of structured control flow when every
//! operation between the barrier and the region boundary is read-none, so
//! reordering cannot change observable memory behavior. Motion is
//! conservative: one unclassifiable operation on the path blocks the move.
//!
//! Registration is gated by [`PassConfig::barrier_motion`]; the pass config
//! simply leaves this pattern out when disabled.
//!
//! [`PassConfig::barrier_motion`]: crate::opt::PassConfig

use crate::{
    error::Result,
    ir::{Module, OpId, OpKind, RegionId},
    rewrite::{PatternSet, RewritePattern},
};

pub fn register(set: &mut PatternSet) {
    set.add(BarrierHoist);
}

pub(crate) struct BarrierHoist;

impl RewritePattern for BarrierHoist {
    fn name(&self) -> &'static str {
        "barrier-hoist"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::Barrier)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        // A barrier over compile-time constants has no effects and no reason
        // to move.
        if module.op_effects(op).is_empty() {
            return Ok(false);
        }
        let Some(parent) = module.parent_op_of(op) else { return Ok(false) };
        match module.op(parent).kind {
            OpKind::If => hoist_from_if(module, op, parent),
            OpKind::While => hoist_from_while(module, op, parent),
            _ => Ok(false),
        }
    }
}

fn all_read_none(module: &Module, region: RegionId, range: std::ops::Range<usize>) -> bool {
    module.region(region).ops()[range].iter().all(|&o| module.is_read_none(o))
}

/// Inside a conditional, a barrier followed (or preceded) only by read-none
/// operations moves directly after (or before) the conditional itself.
fn hoist_from_if(module: &mut Module, op: OpId, parent: OpId) -> Result<bool> {
    let Some((region, index)) = module.position_of(op) else { return Ok(false) };
    let len = module.region(region).ops().len();

    if all_read_none(module, region, index + 1..len) {
        module.detach_op(op);
        module.insert_after(parent, op);
        log::trace!("hoisted barrier below conditional");
        return Ok(true);
    }
    if all_read_none(module, region, 0..index) {
        module.detach_op(op);
        module.insert_before(parent, op);
        log::trace!("hoisted barrier above conditional");
        return Ok(true);
    }
    Ok(false)
}

/// A barrier in a loop's condition region whose tail (up to the condition
/// check) is read-none executes once per iteration plus once on the final
/// exiting evaluation. It is replaced by a barrier at the head of the loop
/// body and one after the loop, which synchronize at exactly the same points.
fn hoist_from_while(module: &mut Module, op: OpId, parent: OpId) -> Result<bool> {
    let Some((region, index)) = module.position_of(op) else { return Ok(false) };
    if module.op(parent).region(0) != Some(region) {
        return Ok(false);
    }
    let Some(body) = module.op(parent).region(1) else { return Ok(false) };
    let len = module.region(region).ops().len();
    if !all_read_none(module, region, index + 1..len) {
        return Ok(false);
    }

    let operands = module.op(op).operands().to_vec();
    let attrs = module.op(op).attrs.clone();

    let at_head = module.create_op(OpKind::Barrier, &operands, &[], &[], attrs.clone());
    module.insert_at(body, 0, at_head);
    let after_loop = module.create_op(OpKind::Barrier, &operands, &[], &[], attrs);
    module.insert_after(parent, after_loop);
    module.erase_op(op);
    log::trace!("split loop-condition barrier into body head and loop exit");
    Ok(true)
}
