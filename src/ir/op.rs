//! Operations, regions and the value references connecting them.

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{impl_slabref, typing::Type};

use super::{
    alias::ResultAlias,
    attrs::{Attribute, Attributes, keys},
    kind::OpKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub(crate) usize);
impl_slabref!(OpId, Operation);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub(crate) usize);
impl_slabref!(RegionId, RegionData);

/// A typed SSA value: the result of an operation or a region argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueId {
    Result { op: OpId, index: u32 },
    Arg { region: RegionId, index: u32 },
}

impl ValueId {
    pub fn result(op: OpId, index: u32) -> Self {
        ValueId::Result { op, index }
    }

    pub fn arg(region: RegionId, index: u32) -> Self {
        ValueId::Arg { region, index }
    }

    /// The operation producing this value, if it is not a region argument.
    pub fn def_op(self) -> Option<OpId> {
        match self {
            ValueId::Result { op, .. } => Some(op),
            ValueId::Arg { .. } => None,
        }
    }
}

/// One use of a value: which operation consumes it and at which operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpUse {
    pub op: OpId,
    pub slot: u32,
}

/// A node in the graph. Owned by its containing region; destroyed when a
/// rewrite erases it.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub(crate) operands: SmallVec<[ValueId; 4]>,
    pub(crate) regions: SmallVec<[RegionId; 1]>,
    pub result_types: SmallVec<[Type; 1]>,
    pub attrs: Attributes,
    pub(crate) parent: Option<RegionId>,
}

impl Operation {
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> Option<ValueId> {
        self.operands.get(index).copied()
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn regions(&self) -> &[RegionId] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<RegionId> {
        self.regions.get(index).copied()
    }

    pub fn num_results(&self) -> usize {
        self.result_types.len()
    }

    pub fn parent_region(&self) -> Option<RegionId> {
        self.parent
    }

    /// Symbol reference of a call-like operation.
    pub fn callee(&self) -> Option<&SmolStr> {
        self.attrs.symbol(keys::CALLEE)
    }

    /// Result-aliasing descriptors; the list length equals the result count
    /// for well-formed launch operations.
    pub fn output_aliases(&self) -> &[ResultAlias] {
        self.attrs.aliases().unwrap_or(&[])
    }

    pub fn set_output_aliases(&mut self, aliases: Vec<ResultAlias>) {
        self.attrs.set(keys::OUTPUT_ALIASES, Attribute::Aliases(aliases));
    }

    /// Candidate descriptions of an alternatives group.
    pub fn alternative_descs(&self) -> &[SmolStr] {
        self.attrs.str_list(keys::ALTERNATIVE_DESCS).unwrap_or(&[])
    }

    pub fn constant_value(&self) -> Option<super::kind::ConstValue> {
        match self.kind {
            OpKind::Constant(value) => Some(value),
            _ => None,
        }
    }
}

/// A nested sub-graph: an ordered list of operations plus typed arguments.
#[derive(Debug, Clone, Default)]
pub struct RegionData {
    pub(crate) parent: Option<OpId>,
    pub(crate) ops: Vec<OpId>,
    pub arg_types: SmallVec<[Type; 2]>,
}

impl RegionData {
    pub fn ops(&self) -> &[OpId] {
        &self.ops
    }

    pub fn parent_op(&self) -> Option<OpId> {
        self.parent
    }

    pub fn num_args(&self) -> usize {
        self.arg_types.len()
    }

    /// The terminator, by convention the last operation of a non-empty region.
    pub fn terminator(&self) -> Option<OpId> {
        self.ops.last().copied()
    }
}
