//! View-conversion canonicalization.
//!
//! Simplifies chains of address/array-view conversions, folds address
//! arithmetic into array indices, and specializes bulk copy/fill intrinsics
//! into explicit loop nests when the byte length is provably divisible by a
//! row's width. Every rule validates all preconditions before mutating; an
//! unprovable precondition is "no match", never an approximation.

use smallvec::SmallVec;

use crate::{
    error::Result,
    ir::{
        Attributes, ConstValue, Module, OpId, OpKind, Operation, ValueId,
    },
    rewrite::{PatternSet, RewritePattern},
    typing::{Layout, Type, ViewType},
};

pub fn register(set: &mut PatternSet) {
    set.add(DoubleConversionToCast);
    set.add(IdentityCastElim);
    set.add(CastThroughViewFromAddr);
    set.add(ViewFromAddrFold);
    set.add(AddrFromViewFold);
    set.add(AddrCastOfDecay);
    set.add(AbsorbAddrOffsets);
    set.add(ElideTrivialCopy);
    set.add(ReconcileCopyElemTypes);
    set.add(SpecializeCopy);
    set.add(SpecializeFill);
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn def_with_kind(
    module: &Module,
    value: ValueId,
    pred: impl Fn(&OpKind) -> bool,
) -> Option<(OpId, &Operation)> {
    let (op, data) = module.defining_op(value)?;
    pred(&data.kind).then_some((op, data))
}

fn view_of(module: &Module, value: ValueId) -> Option<ViewType> {
    module.value_type(value).as_view().cloned()
}

/// Follow a reversible decay round trip: `view_from_addr(addr_from_view(x))`
/// in the same address space resolves back to `x`.
fn unwrap_roundtrip(module: &Module, value: ValueId) -> ValueId {
    let Some((_, vfa)) = def_with_kind(module, value, |k| matches!(k, OpKind::ViewFromAddr))
    else {
        return value;
    };
    let Some((_, afv)) = def_with_kind(module, vfa.operands()[0], |k| {
        matches!(k, OpKind::AddrFromView)
    }) else {
        return value;
    };
    let inner = afv.operands()[0];
    let same_space = module.value_type(value).addr_space() == module.value_type(inner).addr_space();
    if same_space { inner } else { value }
}

// ---------------------------------------------------------------------------
// Conversion-chain rules
// ---------------------------------------------------------------------------

/// `view_from_addr(addr_from_view(x))` becomes a plain `cast` of `x` when the
/// ranks match, all non-leading dimensions agree, and element type and
/// address space are identical.
struct DoubleConversionToCast;

impl RewritePattern for DoubleConversionToCast {
    fn name(&self) -> &'static str {
        "double-conversion-to-cast"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::ViewFromAddr)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let operand = module.op(op).operands()[0];
        let Some((_, src)) = def_with_kind(module, operand, |k| matches!(k, OpKind::AddrFromView))
        else {
            return Ok(false);
        };
        let inner = src.operands()[0];
        let Some(smt) = view_of(module, inner) else { return Ok(false) };
        let Some(omt) = view_of(module, ValueId::result(op, 0)) else { return Ok(false) };

        if !smt.shape_compatible(&omt) || smt.elem != omt.elem || smt.space != omt.space {
            return Ok(false);
        }
        if smt.layout != Layout::Identity || omt.layout != Layout::Identity {
            return Ok(false);
        }

        let out_ty = module.op(op).result_types[0].clone();
        let cast = module.insert_new_before(op, OpKind::Cast, &[inner], &[out_ty]);
        module.replace_op(op, &[ValueId::result(cast, 0)]);
        Ok(true)
    }
}

/// `cast x : T -> T` folds to `x`.
struct IdentityCastElim;

impl RewritePattern for IdentityCastElim {
    fn name(&self) -> &'static str {
        "identity-cast-elim"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::Cast)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let operand = module.op(op).operands()[0];
        if module.value_type(operand) != module.op(op).result_types[0] {
            return Ok(false);
        }
        module.replace_op(op, &[operand]);
        Ok(true)
    }
}

/// `cast(view_from_addr(x))` forwards to `view_from_addr(x)` at the cast's
/// result type.
struct CastThroughViewFromAddr;

impl RewritePattern for CastThroughViewFromAddr {
    fn name(&self) -> &'static str {
        "cast-through-view-from-addr"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::Cast)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let operand = module.op(op).operands()[0];
        let Some((_, src)) = def_with_kind(module, operand, |k| matches!(k, OpKind::ViewFromAddr))
        else {
            return Ok(false);
        };
        let addr = src.operands()[0];
        let out_ty = module.op(op).result_types[0].clone();
        if out_ty.as_view().is_none() {
            return Ok(false);
        }
        let new_op = module.insert_new_before(op, OpKind::ViewFromAddr, &[addr], &[out_ty]);
        module.replace_op(op, &[ValueId::result(new_op, 0)]);
        Ok(true)
    }
}

/// In-place folds on `view_from_addr`: look through address casts and
/// all-zero address offsets.
struct ViewFromAddrFold;

impl RewritePattern for ViewFromAddrFold {
    fn name(&self) -> &'static str {
        "view-from-addr-fold"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::ViewFromAddr)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let operand = module.op(op).operands()[0];
        if let Some((_, cast)) = def_with_kind(module, operand, |k| matches!(k, OpKind::AddrCast))
        {
            let src = cast.operands()[0];
            module.set_operand(op, 0, src);
            return Ok(true);
        }
        if let Some((_, offset)) =
            def_with_kind(module, operand, |k| matches!(k, OpKind::AddrOffset { .. }))
        {
            let base = offset.operands()[0];
            let index = offset.operands()[1];
            if module.const_int(index) == Some(0) {
                module.set_operand(op, 0, base);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// In-place folds on `addr_from_view`: look through view casts, and collapse
/// `addr_from_view(view_from_addr(p))` to `p` when the types agree.
struct AddrFromViewFold;

impl RewritePattern for AddrFromViewFold {
    fn name(&self) -> &'static str {
        "addr-from-view-fold"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::AddrFromView)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let operand = module.op(op).operands()[0];
        if let Some((_, cast)) = def_with_kind(module, operand, |k| matches!(k, OpKind::Cast)) {
            let src = cast.operands()[0];
            module.set_operand(op, 0, src);
            return Ok(true);
        }
        if let Some((_, vfa)) =
            def_with_kind(module, operand, |k| matches!(k, OpKind::ViewFromAddr))
        {
            let addr = vfa.operands()[0];
            if module.value_type(addr) == module.op(op).result_types[0] {
                module.replace_op(op, &[addr]);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `addr_cast(addr_from_view(x))` becomes `addr_from_view(x)` at the cast's
/// result type.
struct AddrCastOfDecay;

impl RewritePattern for AddrCastOfDecay {
    fn name(&self) -> &'static str {
        "addr-cast-of-decay"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::AddrCast)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let operand = module.op(op).operands()[0];
        let Some((_, src)) = def_with_kind(module, operand, |k| matches!(k, OpKind::AddrFromView))
        else {
            return Ok(false);
        };
        let view = src.operands()[0];
        let out_ty = module.op(op).result_types[0].clone();
        let new_op = module.insert_new_before(op, OpKind::AddrFromView, &[view], &[out_ty]);
        module.replace_op(op, &[ValueId::result(new_op, 0)]);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Address-arithmetic absorption
// ---------------------------------------------------------------------------

/// Rewrites a load/store addressed through `view_from_addr(offset chain)` to
/// access the base view directly, with the chain's folded byte offset added
/// to the leading index. Every chain offset must be a compile-time constant
/// whose scaled contribution divides the element size exactly; a dynamic
/// offset blocks the rule.
struct AbsorbAddrOffsets;

impl RewritePattern for AbsorbAddrOffsets {
    fn name(&self) -> &'static str {
        "absorb-addr-offsets"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::Load | OpKind::Store)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        let (view_slot, idx_slot) = match data.kind {
            OpKind::Load => (0usize, 1usize),
            OpKind::Store => (1, 2),
            _ => return Ok(false),
        };
        // Single-index accesses only.
        if data.num_operands() != idx_slot + 1 {
            return Ok(false);
        }
        let view_val = data.operands()[view_slot];
        let idx_val = data.operands()[idx_slot];

        let Some((_, vfa)) = def_with_kind(module, view_val, |k| matches!(k, OpKind::ViewFromAddr))
        else {
            return Ok(false);
        };
        let view_ty = match view_of(module, view_val) {
            Some(v) => v,
            None => return Ok(false),
        };
        let Some(elem_size) = view_ty.elem.byte_size() else { return Ok(false) };

        // Collect the offset chain; every index must be a known constant.
        let mut ptr = vfa.operands()[0];
        let mut chain: SmallVec<[(i64, u64); 4]> = SmallVec::new();
        while let Some((_, gep)) =
            def_with_kind(module, ptr, |k| matches!(k, OpKind::AddrOffset { .. }))
        {
            let OpKind::AddrOffset { elem_size: gep_size } = gep.kind else { unreachable!() };
            let Some(offset) = module.const_int(gep.operands()[1]) else {
                return Ok(false);
            };
            chain.push((offset, gep_size.max(1)));
            ptr = gep.operands()[0];
        }
        if chain.is_empty() {
            return Ok(false);
        }

        // Fold offsets as element counts, reducing by GCD against the target
        // element size so mixed-width chains combine. Extreme front-end
        // constants may still overflow; that makes the fold unprovable.
        let mut total: i64 = 0;
        for &(offset, gep_size) in &chain {
            let g = gcd(gep_size, elem_size);
            let scaled_gep = (gep_size / g) as i64;
            let scaled_elem = (elem_size / g) as i64;
            let Some(scaled) = offset.checked_mul(scaled_gep) else { return Ok(false) };
            if scaled % scaled_elem != 0 {
                return Ok(false);
            }
            let Some(next) = total.checked_add(scaled / scaled_elem) else { return Ok(false) };
            total = next;
        }
        let folded_index = match module.const_int(idx_val) {
            Some(c) => match c.checked_add(total) {
                Some(folded) => Some(folded),
                None => return Ok(false),
            },
            None => None,
        };

        let base_view =
            module.insert_new_before(op, OpKind::ViewFromAddr, &[ptr], &[Type::View(Box::new(view_ty))]);
        let new_index = match folded_index {
            Some(folded) => module.const_index_before(op, folded),
            None => {
                let total_c = module.const_index_before(op, total);
                let add =
                    module.insert_new_before(op, OpKind::Add, &[idx_val, total_c], &[Type::Index]);
                ValueId::result(add, 0)
            }
        };
        module.set_operand(op, view_slot, ValueId::result(base_view, 0));
        module.set_operand(op, idx_slot, new_index);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Bulk copy/fill rules
// ---------------------------------------------------------------------------

/// Walks a byte-length expression through extensions, index casts, truncation
/// and multiplication, accumulating the constant factor. Returns true when
/// the factor is provably a multiple of `width`.
fn length_factor_divisible(module: &Module, len: ValueId, width: u64) -> bool {
    if width == 0 {
        return false;
    }
    let mut todo = vec![len];
    let mut factor: u64 = 1;
    while factor % width != 0 {
        let Some(value) = todo.pop() else { break };
        let Some((_, def)) = module.defining_op(value) else { continue };
        match &def.kind {
            OpKind::ExtU | OpKind::ExtS | OpKind::IndexCast => todo.push(def.operands()[0]),
            OpKind::Trunc => {
                // Truncation may drop high bits; only safe to look through
                // when the narrow type still holds every multiple of width.
                if let Type::Int(bits) = module.value_type(value) {
                    if width.is_power_of_two() && u64::from(bits) > u64::from(width.ilog2()) {
                        todo.push(def.operands()[0]);
                    }
                }
            }
            OpKind::Mul => {
                todo.push(def.operands()[0]);
                todo.push(def.operands()[1]);
            }
            OpKind::Constant(value) => {
                if let Some(c) = value.int_value() {
                    if c > 0 {
                        factor = factor.saturating_mul(c as u64);
                    }
                }
            }
            _ => continue,
        }
    }
    factor % width == 0
}

/// Symbolic size walk as a (numerator, denominator) pair over index casts and
/// power-of-two shifts. A residual denominator other than one means the size
/// cannot be proven integral and the caller must not fire.
fn fold_size_ratio(module: &Module, len: ValueId) -> (u64, u64) {
    let mut num: u64 = 1;
    let mut den: u64 = 1;
    let mut value = len;
    loop {
        let Some((_, def)) = module.defining_op(value) else { break };
        match &def.kind {
            OpKind::IndexCast | OpKind::ExtU | OpKind::ExtS => {
                value = def.operands()[0];
            }
            OpKind::ShrS | OpKind::ShrU => {
                let Some(shift) = module.const_int(def.operands()[1]) else { break };
                let val = 1u64 << (shift as u32).min(63);
                if num % val == 0 {
                    num /= val;
                } else if val % num == 0 {
                    den *= val / num;
                    num = 1;
                } else {
                    break;
                }
                value = def.operands()[0];
            }
            OpKind::Shl => {
                let Some(shift) = module.const_int(def.operands()[1]) else { break };
                let val = 1u64 << (shift as u32).min(63);
                if den % val == 0 {
                    den /= val;
                } else if val % den == 0 {
                    num *= val / den;
                    den = 1;
                } else {
                    break;
                }
                value = def.operands()[0];
            }
            _ => break,
        }
    }
    (num, den)
}

/// Shared validation for copy/fill specialization: destination (and source)
/// views, common element width times the product of trailing dimensions.
struct RowGeometry {
    elem_ty: Type,
    width: u64,
    bounds: Vec<u64>,
}

fn row_geometry(dst: &ViewType, src: Option<&ViewType>) -> Option<RowGeometry> {
    if dst.layout != Layout::Identity || src.is_some_and(|s| s.layout != Layout::Identity) {
        return None;
    }
    if let Some(src) = src {
        if src.rank() != dst.rank() || src.elem != dst.elem {
            return None;
        }
        for (a, b) in dst.dims.iter().zip(&src.dims).skip(1) {
            if a != b {
                return None;
            }
        }
    }
    if !matches!(dst.elem, Type::Int(_) | Type::Float(_)) {
        return None;
    }
    let width = dst.row_byte_width()?;
    let bounds = dst.trailing_bounds()?;
    Some(RowGeometry { elem_ty: dst.elem.clone(), width, bounds })
}

/// Emits `for i in 0..len/width { for j.. { body } }` before `op`, returning
/// the innermost region and the index values in order.
fn build_loop_nest(
    module: &mut Module,
    op: OpId,
    len: ValueId,
    geom: &RowGeometry,
) -> (crate::ir::RegionId, Vec<ValueId>) {
    let len_idx = if module.value_type(len) == Type::Index {
        len
    } else {
        let cast = module.insert_new_before(op, OpKind::IndexCast, &[len], &[Type::Index]);
        ValueId::result(cast, 0)
    };
    let width_c = module.const_index_before(op, geom.width as i64);
    let count = module.insert_new_before(op, OpKind::Div, &[len_idx, width_c], &[Type::Index]);
    let zero = module.const_index_before(op, 0);
    let one = module.const_index_before(op, 1);

    let mut idxs = Vec::new();

    let outer_region = module.create_region([Type::Index]);
    idxs.push(ValueId::arg(outer_region, 0));
    let outer = module.create_op(
        OpKind::For,
        &[zero, ValueId::result(count, 0), one],
        &[],
        &[outer_region],
        Attributes::new(),
    );
    module.insert_before(op, outer);

    let mut cur = outer_region;
    for &bound in &geom.bounds {
        let bound_c = module.const_index_before(op, bound as i64);
        let inner_region = module.create_region([Type::Index]);
        idxs.push(ValueId::arg(inner_region, 0));
        let inner = module.create_op(
            OpKind::For,
            &[zero, bound_c, one],
            &[],
            &[inner_region],
            Attributes::new(),
        );
        module.push_op(cur, inner);
        let term = module.create_op(OpKind::Yield, &[], &[], &[], Attributes::new());
        module.push_op(cur, term);
        cur = inner_region;
    }
    (cur, idxs)
}

fn finish_region(module: &mut Module, region: crate::ir::RegionId) {
    let term = module.create_op(OpKind::Yield, &[], &[], &[], Attributes::new());
    module.push_op(region, term);
}

/// Copy specialization: a byte copy between views of identical geometry whose
/// length is provably a whole number of rows becomes an explicit loop nest of
/// per-element loads and stores.
struct SpecializeCopy;

impl RewritePattern for SpecializeCopy {
    fn name(&self) -> &'static str {
        "specialize-copy"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::MemCopy)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        // Asynchronous forms keep their intrinsic shape.
        if data.num_operands() != 3 || data.num_results() != 0 {
            return Ok(false);
        }
        let dst = unwrap_roundtrip(module, data.operands()[0]);
        let src = unwrap_roundtrip(module, data.operands()[1]);
        let len = module.op(op).operands()[2];

        let (Some(dst_ty), Some(src_ty)) = (view_of(module, dst), view_of(module, src)) else {
            return Ok(false);
        };
        let Some(geom) = row_geometry(&dst_ty, Some(&src_ty)) else { return Ok(false) };
        if !length_factor_divisible(module, len, geom.width) {
            return Ok(false);
        }

        let (body, idxs) = build_loop_nest(module, op, len, &geom);
        let mut load_operands = vec![src];
        load_operands.extend(&idxs);
        let load = module.create_op(
            OpKind::Load,
            &load_operands,
            &[geom.elem_ty.clone()],
            &[],
            Attributes::new(),
        );
        module.push_op(body, load);
        let mut store_operands = vec![ValueId::result(load, 0), dst];
        store_operands.extend(&idxs);
        let store = module.create_op(OpKind::Store, &store_operands, &[], &[], Attributes::new());
        module.push_op(body, store);
        finish_region(module, body);

        module.erase_op(op);
        Ok(true)
    }
}

/// Fill specialization: stores the element type's zero value instead of
/// loading from a source.
struct SpecializeFill;

impl RewritePattern for SpecializeFill {
    fn name(&self) -> &'static str {
        "specialize-fill"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::MemFill)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        if data.num_operands() != 2 || data.num_results() != 0 {
            return Ok(false);
        }
        let dst = unwrap_roundtrip(module, data.operands()[0]);
        let len = module.op(op).operands()[1];

        let Some(dst_ty) = view_of(module, dst) else { return Ok(false) };
        let Some(geom) = row_geometry(&dst_ty, None) else { return Ok(false) };
        if !length_factor_divisible(module, len, geom.width) {
            return Ok(false);
        }

        let zero = match geom.elem_ty {
            Type::Int(width) => ConstValue::Int { value: 0, width },
            Type::Float(width) => ConstValue::Float { bits: 0, width },
            _ => return Ok(false),
        };
        let zero_op = module.insert_new_before(
            op,
            OpKind::Constant(zero),
            &[],
            &[geom.elem_ty.clone()],
        );

        let (body, idxs) = build_loop_nest(module, op, len, &geom);
        let mut store_operands = vec![ValueId::result(zero_op, 0), dst];
        store_operands.extend(&idxs);
        let store = module.create_op(OpKind::Store, &store_operands, &[], &[], Attributes::new());
        module.push_op(body, store);
        finish_region(module, body);

        module.erase_op(op);
        Ok(true)
    }
}

/// Heterogeneous-element copy reconciliation: when exactly one side of a byte
/// copy has single-byte granularity, that side is re-viewed to the other
/// side's element type with an unknown-length trailing dimension.
struct ReconcileCopyElemTypes;

impl RewritePattern for ReconcileCopyElemTypes {
    fn name(&self) -> &'static str {
        "reconcile-copy-elem-types"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::MemCopy)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        if data.num_operands() < 3 {
            return Ok(false);
        }
        let raw_dst = data.operands()[0];
        let raw_src = data.operands()[1];
        let len = data.operands()[2];

        let dst = unwrap_roundtrip(module, raw_dst);
        let src = unwrap_roundtrip(module, raw_src);
        let (Some(dst_ty), Some(src_ty)) = (view_of(module, dst), view_of(module, src)) else {
            return Ok(false);
        };

        if dst_ty.layout != Layout::Identity || src_ty.layout != Layout::Identity {
            return Ok(false);
        }
        let final_elem = if dst_ty.elem == src_ty.elem {
            return Ok(false);
        } else if dst_ty.elem.is_byte() {
            src_ty.elem.clone()
        } else if src_ty.elem.is_byte() {
            dst_ty.elem.clone()
        } else {
            // Neither side is byte-granularity: left unmodified.
            return Ok(false);
        };

        let Some(cur_dst_ty) = view_of(module, raw_dst) else { return Ok(false) };
        if final_elem == cur_dst_ty.elem {
            return Ok(false);
        }

        // The length must decompose into whole elements of the final type.
        let Some(cur_elem_size) = cur_dst_ty.elem.byte_size() else { return Ok(false) };
        let Some(final_size) = final_elem.byte_size() else { return Ok(false) };
        let byte_count = match module.const_int(len) {
            Some(c) if c >= 0 => cur_elem_size * c as u64,
            Some(_) => return Ok(false),
            None => {
                let (num, den) = fold_size_ratio(module, len);
                if den != 1 {
                    // A residual denominator means the walk could not prove an
                    // integral size; fail closed instead of asserting.
                    return Ok(false);
                }
                cur_elem_size * num
            }
        };
        if byte_count % final_size != 0 {
            return Ok(false);
        }

        for (slot, (value, view_ty)) in [(0usize, (dst, &dst_ty)), (1, (src, &src_ty))] {
            if view_ty.elem == final_elem {
                if module.op(op).operands()[slot] != value {
                    module.set_operand(op, slot, value);
                }
                continue;
            }
            let addr_ty = Type::Addr(view_ty.space);
            let decay = module.insert_new_before(op, OpKind::AddrFromView, &[value], &[addr_ty]);
            let new_view_ty = view_ty.with_elem_dynamic_tail(final_elem.clone());
            let review = module.insert_new_before(
                op,
                OpKind::ViewFromAddr,
                &[ValueId::result(decay, 0)],
                &[Type::View(Box::new(new_view_ty))],
            );
            module.set_operand(op, slot, ValueId::result(review, 0));
        }
        Ok(true)
    }
}

/// Trivial-copy elision: a copy into a freshly allocated destination that is
/// only ever copied into and deallocated is removed, with its asynchronous
/// token (if any) replaced by its single dependency.
struct ElideTrivialCopy;

impl RewritePattern for ElideTrivialCopy {
    fn name(&self) -> &'static str {
        "elide-trivial-copy"
    }
    fn matches_kind(&self, kind: &OpKind) -> bool {
        matches!(kind, OpKind::MemCopy)
    }
    fn match_and_rewrite(&self, op: OpId, module: &mut Module) -> Result<bool> {
        let data = module.op(op);
        if data.num_operands() < 3 {
            return Ok(false);
        }
        let dst = data.operands()[0];
        let deps: Vec<ValueId> = data.operands()[3..].to_vec();
        let has_token =
            data.num_results() == 1 && data.result_types[0] == Type::Token;

        // Destination must be freshly allocated.
        if def_with_kind(module, dst, |k| matches!(k, OpKind::Alloc)).is_none() {
            return Ok(false);
        }

        // Every other user of the destination must be a deallocation.
        for use_ in module.users(dst) {
            if use_.op == op {
                continue;
            }
            if !matches!(module.op(use_.op).kind, OpKind::Dealloc) {
                return Ok(false);
            }
        }

        // Token/dependency arity must be consistent: either no dependency and
        // no token, or exactly one of each.
        if deps.len() > 1 || (deps.is_empty() && has_token) || (!deps.is_empty() && !has_token) {
            return Ok(false);
        }

        if has_token {
            module.replace_op(op, &deps);
        } else {
            module.erase_op(op);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::print_module,
        opt::{PassConfig, optimize_module},
        typing::{AddrSpace, Dim},
    };
    use proptest::prelude::*;

    fn f32_view(dims: &[Dim]) -> Type {
        Type::view(Type::Float(32), dims.iter().copied(), AddrSpace::GENERIC)
    }

    fn addr() -> Type {
        Type::Addr(AddrSpace::GENERIC)
    }

    fn push(module: &mut Module, kind: OpKind, operands: &[ValueId], results: &[Type]) -> OpId {
        let body = module.body();
        let op = module.create_op(kind, operands, results, &[], Attributes::new());
        module.push_op(body, op);
        op
    }

    fn opaque_value(module: &mut Module, ty: Type) -> ValueId {
        let op = push(module, OpKind::Opaque("runtime_value".into()), &[], &[ty]);
        ValueId::result(op, 0)
    }

    fn run(module: &mut Module) {
        optimize_module(module, &PassConfig::default()).unwrap();
    }

    #[test]
    fn double_conversion_folds_to_original_value() {
        let mut module = Module::new("round_trip");
        let view_ty = f32_view(&[Dim::Fixed(4), Dim::Fixed(8)]);
        let x = opaque_value(&mut module, view_ty.clone());
        let decay = push(&mut module, OpKind::AddrFromView, &[x], &[addr()]);
        let review = push(
            &mut module,
            OpKind::ViewFromAddr,
            &[ValueId::result(decay, 0)],
            &[view_ty.clone()],
        );
        let sink = push(
            &mut module,
            OpKind::Opaque("sink".into()),
            &[ValueId::result(review, 0)],
            &[],
        );

        run(&mut module);

        // Identical types: the cast folds away entirely and the sink sees x.
        assert_eq!(module.op(sink).operands(), &[x]);
    }

    #[test]
    fn double_conversion_respects_leading_dim_only() {
        let mut module = Module::new("leading_dim");
        let x = opaque_value(&mut module, f32_view(&[Dim::Fixed(4), Dim::Fixed(8)]));
        let decay = push(&mut module, OpKind::AddrFromView, &[x], &[addr()]);
        // Different leading dimension is allowed: folds to a cast.
        let review = push(
            &mut module,
            OpKind::ViewFromAddr,
            &[ValueId::result(decay, 0)],
            &[f32_view(&[Dim::Dynamic, Dim::Fixed(8)])],
        );
        let sink = push(
            &mut module,
            OpKind::Opaque("sink".into()),
            &[ValueId::result(review, 0)],
            &[],
        );

        run(&mut module);
        let (op, def) = module.defining_op(module.op(sink).operands()[0]).unwrap();
        let _ = op;
        assert!(matches!(def.kind, OpKind::Cast));
        assert_eq!(def.operands(), &[x]);
    }

    #[test]
    fn double_conversion_blocked_by_trailing_dim_mismatch() {
        let mut module = Module::new("mismatch");
        let x = opaque_value(&mut module, f32_view(&[Dim::Fixed(4), Dim::Fixed(8)]));
        let decay = push(&mut module, OpKind::AddrFromView, &[x], &[addr()]);
        let review = push(
            &mut module,
            OpKind::ViewFromAddr,
            &[ValueId::result(decay, 0)],
            &[f32_view(&[Dim::Fixed(4), Dim::Fixed(16)])],
        );
        let _sink = push(
            &mut module,
            OpKind::Opaque("sink".into()),
            &[ValueId::result(review, 0)],
            &[],
        );

        let before = print_module(&module);
        run(&mut module);
        assert_eq!(print_module(&module), before);
    }

    #[test]
    fn absorb_folds_constant_offset_chain() {
        let mut module = Module::new("absorb");
        let view_ty = f32_view(&[Dim::Fixed(64)]);
        let base = opaque_value(&mut module, addr());
        // Two offsets: 8 bytes (i8 gep) + 2 floats (f32 gep) = 2 + 2 elements.
        let c8 = push(&mut module, OpKind::Constant(ConstValue::Index(8)), &[], &[Type::Index]);
        let gep1 = push(
            &mut module,
            OpKind::AddrOffset { elem_size: 1 },
            &[base, ValueId::result(c8, 0)],
            &[addr()],
        );
        let c2 = push(&mut module, OpKind::Constant(ConstValue::Index(2)), &[], &[Type::Index]);
        let gep2 = push(
            &mut module,
            OpKind::AddrOffset { elem_size: 4 },
            &[ValueId::result(gep1, 0), ValueId::result(c2, 0)],
            &[addr()],
        );
        let view = push(
            &mut module,
            OpKind::ViewFromAddr,
            &[ValueId::result(gep2, 0)],
            &[view_ty.clone()],
        );
        let c1 = push(&mut module, OpKind::Constant(ConstValue::Index(1)), &[], &[Type::Index]);
        let load = push(
            &mut module,
            OpKind::Load,
            &[ValueId::result(view, 0), ValueId::result(c1, 0)],
            &[Type::Float(32)],
        );

        run(&mut module);

        // New leading index: 1 + 8/4 + 2 = 5, view rebased on the raw address.
        let idx = module.op(load).operands()[1];
        assert_eq!(module.const_int(idx), Some(5));
        let (_, new_view) = module.defining_op(module.op(load).operands()[0]).unwrap();
        assert!(matches!(new_view.kind, OpKind::ViewFromAddr));
        assert_eq!(new_view.operands(), &[base]);
    }

    #[test]
    fn absorb_blocked_by_unaligned_constant() {
        let mut module = Module::new("unaligned");
        let view_ty = f32_view(&[Dim::Fixed(64)]);
        let base = opaque_value(&mut module, addr());
        // 3 bytes is not a multiple of the f32 element size.
        let c3 = push(&mut module, OpKind::Constant(ConstValue::Index(3)), &[], &[Type::Index]);
        let gep = push(
            &mut module,
            OpKind::AddrOffset { elem_size: 1 },
            &[base, ValueId::result(c3, 0)],
            &[addr()],
        );
        let view = push(
            &mut module,
            OpKind::ViewFromAddr,
            &[ValueId::result(gep, 0)],
            &[view_ty],
        );
        let c0 = push(&mut module, OpKind::Constant(ConstValue::Index(0)), &[], &[Type::Index]);
        let _load = push(
            &mut module,
            OpKind::Load,
            &[ValueId::result(view, 0), ValueId::result(c0, 0)],
            &[Type::Float(32)],
        );

        let before = print_module(&module);
        run(&mut module);
        assert_eq!(print_module(&module), before);
    }

    #[test]
    fn absorb_blocked_by_overflowing_offset() {
        let mut module = Module::new("overflow");
        let view_ty = f32_view(&[Dim::Fixed(64)]);
        let base = opaque_value(&mut module, addr());
        // i64::MAX doubles when rescaled from 8-byte to 4-byte elements.
        let big = push(
            &mut module,
            OpKind::Constant(ConstValue::Index(i64::MAX)),
            &[],
            &[Type::Index],
        );
        let gep = push(
            &mut module,
            OpKind::AddrOffset { elem_size: 8 },
            &[base, ValueId::result(big, 0)],
            &[addr()],
        );
        let view = push(
            &mut module,
            OpKind::ViewFromAddr,
            &[ValueId::result(gep, 0)],
            &[view_ty],
        );
        let c0 = push(&mut module, OpKind::Constant(ConstValue::Index(0)), &[], &[Type::Index]);
        let _load = push(
            &mut module,
            OpKind::Load,
            &[ValueId::result(view, 0), ValueId::result(c0, 0)],
            &[Type::Float(32)],
        );

        let before = print_module(&module);
        run(&mut module);
        assert_eq!(print_module(&module), before);
    }

    proptest! {
        /// Conservatism: a chain containing one symbolic offset never absorbs,
        /// no matter what constant offsets surround it.
        #[test]
        fn absorb_never_fires_on_symbolic_offset(
            consts in proptest::collection::vec(0i64..64, 0..4),
            sym_pos in 0usize..4,
        ) {
            let mut module = Module::new("conservatism");
            let view_ty = f32_view(&[Dim::Fixed(64)]);
            let base = opaque_value(&mut module, addr());
            let sym = opaque_value(&mut module, Type::Index);

            let mut ptr = base;
            let sym_pos = sym_pos.min(consts.len());
            for (i, &c) in consts.iter().enumerate() {
                if i == sym_pos {
                    let gep = push(&mut module, OpKind::AddrOffset { elem_size: 4 },
                        &[ptr, sym], &[addr()]);
                    ptr = ValueId::result(gep, 0);
                }
                let cst = push(&mut module, OpKind::Constant(ConstValue::Index(c * 4)),
                    &[], &[Type::Index]);
                let gep = push(&mut module, OpKind::AddrOffset { elem_size: 1 },
                    &[ptr, ValueId::result(cst, 0)], &[addr()]);
                ptr = ValueId::result(gep, 0);
            }
            if sym_pos >= consts.len() {
                let gep = push(&mut module, OpKind::AddrOffset { elem_size: 4 },
                    &[ptr, sym], &[addr()]);
                ptr = ValueId::result(gep, 0);
            }

            let view = push(&mut module, OpKind::ViewFromAddr, &[ptr], &[view_ty]);
            let c0 = push(&mut module, OpKind::Constant(ConstValue::Index(0)),
                &[], &[Type::Index]);
            let load = push(&mut module, OpKind::Load,
                &[ValueId::result(view, 0), ValueId::result(c0, 0)], &[Type::Float(32)]);

            let mut set = PatternSet::new();
            set.add(AbsorbAddrOffsets);
            let stats = crate::rewrite::run_to_fixed_point(
                &mut module, &set, &Default::default()).unwrap();
            prop_assert_eq!(stats.applications, 0);
            // The load still addresses the original conversion.
            prop_assert_eq!(module.op(load).operands()[0], ValueId::result(view, 0));
        }
    }

    #[test]
    fn copy_specializes_into_loop_nest() {
        let mut module = Module::new("copy_loops");
        let view_ty = f32_view(&[Dim::Dynamic, Dim::Fixed(8)]);
        let dst = opaque_value(&mut module, view_ty.clone());
        let src = opaque_value(&mut module, view_ty);
        // len = n * 32 bytes, one full row per iteration.
        let n = opaque_value(&mut module, Type::Int(64));
        let c32 = push(
            &mut module,
            OpKind::Constant(ConstValue::Int { value: 32, width: 64 }),
            &[],
            &[Type::Int(64)],
        );
        let len = push(&mut module, OpKind::Mul, &[n, ValueId::result(c32, 0)], &[Type::Int(64)]);
        let _copy = push(
            &mut module,
            OpKind::MemCopy,
            &[dst, src, ValueId::result(len, 0)],
            &[],
        );

        run(&mut module);

        let printed = print_module(&module);
        assert!(!printed.contains("mem_copy"), "copy must be specialized:\n{printed}");
        assert!(printed.contains("for"));
        assert!(printed.contains("load"));
        assert!(printed.contains("store"));
    }

    #[test]
    fn copy_with_unprovable_length_is_untouched() {
        let mut module = Module::new("copy_blocked");
        let view_ty = f32_view(&[Dim::Dynamic, Dim::Fixed(8)]);
        let dst = opaque_value(&mut module, view_ty.clone());
        let src = opaque_value(&mut module, view_ty);
        let len = opaque_value(&mut module, Type::Int(64));
        let _copy = push(&mut module, OpKind::MemCopy, &[dst, src, len], &[]);

        let before = print_module(&module);
        run(&mut module);
        assert_eq!(print_module(&module), before);
    }

    #[test]
    fn fill_stores_zero_elements() {
        let mut module = Module::new("fill");
        let dst = opaque_value(&mut module, f32_view(&[Dim::Fixed(4), Dim::Fixed(2)]));
        let c64 = push(
            &mut module,
            OpKind::Constant(ConstValue::Int { value: 64, width: 64 }),
            &[],
            &[Type::Int(64)],
        );
        let _fill = push(&mut module, OpKind::MemFill, &[dst, ValueId::result(c64, 0)], &[]);

        run(&mut module);
        let printed = print_module(&module);
        assert!(!printed.contains("mem_fill"));
        assert!(printed.contains("store"));
        assert!(!printed.contains("load"));
    }

    #[test]
    fn heterogeneous_copy_reviews_byte_side() {
        let mut module = Module::new("hetero");
        let byte_view = Type::view(
            Type::Int(8),
            [Dim::Fixed(4), Dim::Fixed(32)],
            AddrSpace::GENERIC,
        );
        let f64_view = Type::view(
            Type::Float(64),
            [Dim::Fixed(4), Dim::Fixed(4)],
            AddrSpace::GENERIC,
        );
        let dst = opaque_value(&mut module, byte_view);
        let src = opaque_value(&mut module, f64_view);
        let c128 = push(
            &mut module,
            OpKind::Constant(ConstValue::Int { value: 128, width: 64 }),
            &[],
            &[Type::Int(64)],
        );
        let copy = push(
            &mut module,
            OpKind::MemCopy,
            &[dst, src, ValueId::result(c128, 0)],
            &[],
        );

        let mut set = PatternSet::new();
        set.add(ReconcileCopyElemTypes);
        crate::rewrite::run_to_fixed_point(&mut module, &set, &Default::default()).unwrap();

        let new_dst = module.op(copy).operands()[0];
        let dst_view = module.value_type(new_dst);
        let dst_view = dst_view.as_view().unwrap();
        assert_eq!(dst_view.elem, Type::Float(64));
        assert_eq!(dst_view.dims.last(), Some(&Dim::Dynamic));
        // Source keeps its type.
        assert_eq!(module.op(copy).operands()[1], src);
    }

    #[test]
    fn trivial_copy_is_removed_with_its_token() {
        let mut module = Module::new("trivial");
        let view_ty = f32_view(&[Dim::Fixed(16)]);
        let alloc = push(&mut module, OpKind::Alloc, &[], &[view_ty.clone()]);
        let dst = ValueId::result(alloc, 0);
        let src = opaque_value(&mut module, view_ty);
        let len = push(
            &mut module,
            OpKind::Constant(ConstValue::Int { value: 64, width: 64 }),
            &[],
            &[Type::Int(64)],
        );
        let dep = opaque_value(&mut module, Type::Token);
        let copy = push(
            &mut module,
            OpKind::MemCopy,
            &[dst, src, ValueId::result(len, 0), dep],
            &[Type::Token],
        );
        let sink = push(
            &mut module,
            OpKind::Opaque("await".into()),
            &[ValueId::result(copy, 0)],
            &[],
        );
        let _dealloc = push(&mut module, OpKind::Dealloc, &[dst], &[]);

        let mut set = PatternSet::new();
        set.add(ElideTrivialCopy);
        crate::rewrite::run_to_fixed_point(&mut module, &set, &Default::default()).unwrap();

        // Token consumers now wait on the copy's dependency directly.
        assert_eq!(module.op(sink).operands(), &[dep]);
        assert!(!print_module(&module).contains("mem_copy"));
    }

    #[test]
    fn copy_with_extra_destination_user_is_kept() {
        let mut module = Module::new("kept");
        let view_ty = f32_view(&[Dim::Fixed(16)]);
        let alloc = push(&mut module, OpKind::Alloc, &[], &[view_ty.clone()]);
        let dst = ValueId::result(alloc, 0);
        let src = opaque_value(&mut module, view_ty);
        let len = opaque_value(&mut module, Type::Int(64));
        let _copy = push(&mut module, OpKind::MemCopy, &[dst, src, len], &[]);
        // A real read of the destination blocks elision.
        let c0 = push(&mut module, OpKind::Constant(ConstValue::Index(0)), &[], &[Type::Index]);
        let _load = push(
            &mut module,
            OpKind::Load,
            &[dst, ValueId::result(c0, 0)],
            &[Type::Float(32)],
        );

        let mut set = PatternSet::new();
        set.add(ElideTrivialCopy);
        let stats =
            crate::rewrite::run_to_fixed_point(&mut module, &set, &Default::default()).unwrap();
        assert_eq!(stats.applications, 0);
    }
}
