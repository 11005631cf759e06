//! The compilation unit: arenas, use tracking and the graph mutation API.
//!
//! All structural mutation goes through [`Module`] so the bidirectional
//! value-to-users map stays consistent. Mutations take effect immediately;
//! there is no transactional rollback, so rewrite patterns must fully
//! validate their preconditions before the first mutation.

use std::collections::HashMap;

use slab::Slab;
use smallvec::SmallVec;

use crate::{base::SlabRef, typing::Type};

use super::{
    effects::MemoryEffectSet,
    kind::{ConstValue, OpKind},
    op::{OpId, OpUse, Operation, RegionId, RegionData, ValueId},
    symbols::SymbolTable,
    attrs::Attributes,
};

#[derive(Debug, Default)]
pub struct IrAllocs {
    pub ops: Slab<Operation>,
    pub regions: Slab<RegionData>,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    allocs: IrAllocs,
    pub symbols: SymbolTable,
    body: RegionId,
    users: HashMap<ValueId, Vec<OpUse>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let mut allocs = IrAllocs::default();
        let body = RegionId(allocs.regions.insert(RegionData::default()));
        Self { name: name.into(), allocs, symbols: SymbolTable::new(), body, users: HashMap::new() }
    }

    /// Top-level region holding the module's operations.
    pub fn body(&self) -> RegionId {
        self.body
    }

    pub fn op(&self, id: OpId) -> &Operation {
        id.to_data(&self.allocs.ops)
    }

    pub(crate) fn op_mut(&mut self, id: OpId) -> &mut Operation {
        id.to_data_mut(&mut self.allocs.ops)
    }

    pub fn region(&self, id: RegionId) -> &RegionData {
        id.to_data(&self.allocs.regions)
    }

    fn region_mut(&mut self, id: RegionId) -> &mut RegionData {
        id.to_data_mut(&mut self.allocs.regions)
    }

    // ---- construction ----

    pub fn create_region(&mut self, arg_types: impl IntoIterator<Item = Type>) -> RegionId {
        RegionId(self.allocs.regions.insert(RegionData {
            parent: None,
            ops: Vec::new(),
            arg_types: arg_types.into_iter().collect(),
        }))
    }

    /// Create a detached operation. Regions passed here must themselves be
    /// detached; they become owned by the new operation.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: &[ValueId],
        result_types: &[Type],
        regions: &[RegionId],
        attrs: Attributes,
    ) -> OpId {
        let id = OpId(self.allocs.ops.insert(Operation {
            kind,
            operands: SmallVec::from_slice(operands),
            regions: SmallVec::from_slice(regions),
            result_types: result_types.iter().cloned().collect(),
            attrs,
            parent: None,
        }));
        for (slot, &value) in operands.iter().enumerate() {
            self.users.entry(value).or_default().push(OpUse { op: id, slot: slot as u32 });
        }
        for &region in regions {
            let data = self.region_mut(region);
            debug_assert!(data.parent.is_none(), "region is already attached");
            data.parent = Some(id);
        }
        id
    }

    pub fn push_op(&mut self, region: RegionId, op: OpId) {
        debug_assert!(self.op(op).parent.is_none(), "op is already attached");
        self.region_mut(region).ops.push(op);
        self.op_mut(op).parent = Some(region);
    }

    pub fn insert_at(&mut self, region: RegionId, index: usize, op: OpId) {
        debug_assert!(self.op(op).parent.is_none(), "op is already attached");
        self.region_mut(region).ops.insert(index, op);
        self.op_mut(op).parent = Some(region);
    }

    /// Position of an attached operation inside its parent region.
    pub fn position_of(&self, op: OpId) -> Option<(RegionId, usize)> {
        let region = self.op(op).parent?;
        let index = self.region(region).ops.iter().position(|&o| o == op)?;
        Some((region, index))
    }

    pub fn insert_before(&mut self, anchor: OpId, op: OpId) {
        let (region, index) = self.position_of(anchor).expect("anchor must be attached");
        self.insert_at(region, index, op);
    }

    pub fn insert_after(&mut self, anchor: OpId, op: OpId) {
        let (region, index) = self.position_of(anchor).expect("anchor must be attached");
        self.insert_at(region, index + 1, op);
    }

    /// Unlink an operation from its parent region without destroying it.
    pub fn detach_op(&mut self, op: OpId) {
        if let Some((region, index)) = self.position_of(op) {
            self.region_mut(region).ops.remove(index);
            self.op_mut(op).parent = None;
        }
    }

    // ---- destruction ----

    /// Erase an operation, its nested regions and everything they contain.
    /// The operation's results must be unused by then.
    pub fn erase_op(&mut self, op: OpId) {
        debug_assert!(
            (0..self.op(op).num_results())
                .all(|i| !self.has_users(ValueId::result(op, i as u32))),
            "erasing an op whose results still have users"
        );
        self.detach_op(op);
        self.erase_subtree(op);
    }

    fn erase_subtree(&mut self, op: OpId) {
        let regions: SmallVec<[RegionId; 1]> = self.op(op).regions.clone();
        for region in regions {
            let ops = std::mem::take(&mut self.region_mut(region).ops);
            for child in ops {
                self.op_mut(child).parent = None;
                self.erase_subtree(child);
            }
            self.allocs.regions.remove(region.get_handle());
        }
        let operands: SmallVec<[ValueId; 4]> = self.op(op).operands.clone();
        for (slot, value) in operands.into_iter().enumerate() {
            self.unregister_use(value, OpUse { op, slot: slot as u32 });
        }
        for i in 0..self.op(op).num_results() {
            self.users.remove(&ValueId::result(op, i as u32));
        }
        self.allocs.ops.remove(op.get_handle());
    }

    // ---- use tracking ----

    fn unregister_use(&mut self, value: ValueId, use_: OpUse) {
        if let Some(list) = self.users.get_mut(&value) {
            if let Some(pos) = list.iter().position(|u| *u == use_) {
                list.remove(pos);
            }
            if list.is_empty() {
                self.users.remove(&value);
            }
        }
    }

    pub fn users(&self, value: ValueId) -> &[OpUse] {
        self.users.get(&value).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_users(&self, value: ValueId) -> bool {
        !self.users(value).is_empty()
    }

    pub fn set_operand(&mut self, op: OpId, slot: usize, value: ValueId) {
        let old = self.op(op).operands[slot];
        if old == value {
            return;
        }
        self.unregister_use(old, OpUse { op, slot: slot as u32 });
        self.op_mut(op).operands[slot] = value;
        self.users.entry(value).or_default().push(OpUse { op, slot: slot as u32 });
    }

    /// Replace the whole operand list, rebuilding use records.
    pub fn set_operands(&mut self, op: OpId, operands: &[ValueId]) {
        let old: SmallVec<[ValueId; 4]> = self.op(op).operands.clone();
        for (slot, value) in old.into_iter().enumerate() {
            self.unregister_use(value, OpUse { op, slot: slot as u32 });
        }
        self.op_mut(op).operands = SmallVec::from_slice(operands);
        for (slot, &value) in operands.iter().enumerate() {
            self.users.entry(value).or_default().push(OpUse { op, slot: slot as u32 });
        }
    }

    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        let uses = match self.users.remove(&old) {
            Some(list) => list,
            None => return,
        };
        for use_ in &uses {
            self.op_mut(use_.op).operands[use_.slot as usize] = new;
        }
        self.users.entry(new).or_default().extend(uses);
    }

    /// Replace every result of `op` with the given values, then erase it.
    pub fn replace_op(&mut self, op: OpId, replacements: &[ValueId]) {
        assert_eq!(replacements.len(), self.op(op).num_results(), "replacement arity mismatch");
        for (i, &new) in replacements.iter().enumerate() {
            self.replace_all_uses(ValueId::result(op, i as u32), new);
        }
        self.erase_op(op);
    }

    // ---- queries ----

    pub fn value_type(&self, value: ValueId) -> Type {
        match value {
            ValueId::Result { op, index } => self.op(op).result_types[index as usize].clone(),
            ValueId::Arg { region, index } => self.region(region).arg_types[index as usize].clone(),
        }
    }

    pub fn defining_op(&self, value: ValueId) -> Option<(OpId, &Operation)> {
        let op = value.def_op()?;
        Some((op, self.op(op)))
    }

    /// Compile-time integer payload of a value, when its producer is an
    /// integer or index constant.
    pub fn const_int(&self, value: ValueId) -> Option<i64> {
        self.defining_op(value)?.1.constant_value()?.int_value()
    }

    pub fn is_constant(&self, value: ValueId) -> bool {
        self.defining_op(value).is_some_and(|(_, op)| matches!(op.kind, OpKind::Constant(_)))
    }

    /// Parent operation of the region containing `op`, if any.
    pub fn parent_op_of(&self, op: OpId) -> Option<OpId> {
        self.region(self.op(op).parent?).parent
    }

    pub fn has_ancestor_of_kind(&self, op: OpId, pred: impl Fn(&OpKind) -> bool) -> bool {
        let mut cur = self.parent_op_of(op);
        while let Some(ancestor) = cur {
            if pred(&self.op(ancestor).kind) {
                return true;
            }
            cur = self.parent_op_of(ancestor);
        }
        false
    }

    /// Pre-order walk of every operation in the module.
    pub fn walk_ops(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        let mut stack: Vec<RegionId> = vec![self.body];
        while let Some(region) = stack.pop() {
            for &op in &self.region(region).ops {
                out.push(op);
                // Reverse keeps sibling regions in declaration order overall.
                for &nested in self.op(op).regions.iter().rev() {
                    stack.push(nested);
                }
            }
        }
        out
    }

    // ---- effects ----

    /// Memory effects of one operation, consulting the symbol table for
    /// call-like kinds at query time.
    pub fn op_effects(&self, op: OpId) -> MemoryEffectSet {
        use OpKind::*;
        let data = self.op(op);
        match &data.kind {
            Load => MemoryEffectSet::READ,
            Store => MemoryEffectSet::WRITE,
            MemCopy => MemoryEffectSet::READ | MemoryEffectSet::WRITE,
            MemFill => MemoryEffectSet::WRITE,
            Alloc => MemoryEffectSet::ALLOCATE,
            Dealloc => MemoryEffectSet::FREE,
            // An explicit effects attribute on the operation wins; otherwise
            // the callee's declaration decides, defaulting to all effects.
            KernelCall | JitCall | Call => match data.attrs.effects() {
                Some(set) => set,
                None => match data.callee() {
                    Some(name) => match self.symbols.lookup(name) {
                        Some(info) => info.effect_set(),
                        None => MemoryEffectSet::all_effects(),
                    },
                    None => MemoryEffectSet::all_effects(),
                },
            },
            // A barrier over compile-time constants synchronizes nothing.
            Barrier => {
                if data.operands.iter().all(|&v| self.is_constant(v)) {
                    MemoryEffectSet::empty()
                } else {
                    MemoryEffectSet::READ | MemoryEffectSet::WRITE
                }
            }
            Opaque(_) => data.attrs.effects().unwrap_or_else(MemoryEffectSet::all_effects),
            If | While | For | Alternatives => {
                let mut set = MemoryEffectSet::empty();
                for &region in data.regions.iter() {
                    for &child in self.region(region).ops() {
                        set |= self.op_effects(child);
                    }
                }
                set
            }
            _ => MemoryEffectSet::empty(),
        }
    }

    pub fn is_read_none(&self, op: OpId) -> bool {
        self.op_effects(op).is_read_none()
    }

    // ---- cloning ----

    /// Deep-clone `op` (regions included) to the end of `dest`, remapping
    /// operand values through `map` and recording the clone's results there.
    pub fn clone_op_into(
        &mut self,
        op: OpId,
        dest: RegionId,
        map: &mut HashMap<ValueId, ValueId>,
    ) -> OpId {
        let src = self.op(op);
        let kind = src.kind.clone();
        let attrs = src.attrs.clone();
        let result_types: Vec<Type> = src.result_types.to_vec();
        let operands: Vec<ValueId> =
            src.operands.iter().map(|v| map.get(v).copied().unwrap_or(*v)).collect();
        let src_regions: SmallVec<[RegionId; 1]> = src.regions.clone();

        let mut new_regions = Vec::with_capacity(src_regions.len());
        for region in src_regions {
            let arg_types: Vec<Type> = self.region(region).arg_types.to_vec();
            let new_region = self.create_region(arg_types);
            for i in 0..self.region(region).num_args() {
                map.insert(
                    ValueId::arg(region, i as u32),
                    ValueId::arg(new_region, i as u32),
                );
            }
            let children = self.region(region).ops.clone();
            for child in children {
                self.clone_op_into(child, new_region, map);
            }
            new_regions.push(new_region);
        }

        let new_op = self.create_op(kind, &operands, &result_types, &new_regions, attrs);
        for i in 0..self.op(new_op).num_results() {
            map.insert(ValueId::result(op, i as u32), ValueId::result(new_op, i as u32));
        }
        self.push_op(dest, new_op);
        new_op
    }

    // ---- convenience builders ----

    /// Create an operation and insert it before `anchor`.
    pub fn insert_new_before(
        &mut self,
        anchor: OpId,
        kind: OpKind,
        operands: &[ValueId],
        result_types: &[Type],
    ) -> OpId {
        let op = self.create_op(kind, operands, result_types, &[], Attributes::new());
        self.insert_before(anchor, op);
        op
    }

    /// Materialize an index constant before `anchor`.
    pub fn const_index_before(&mut self, anchor: OpId, value: i64) -> ValueId {
        let op = self.insert_new_before(
            anchor,
            OpKind::Constant(ConstValue::Index(value)),
            &[],
            &[Type::Index],
        );
        ValueId::result(op, 0)
    }
}
