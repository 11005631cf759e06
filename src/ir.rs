//! The IR graph model: operations, values, regions, attributes and symbols.

mod alias;
mod attrs;
mod effects;
mod kind;
mod module;
mod op;
mod print;
mod symbols;
mod verify;

pub use self::{
    alias::{ResultAlias, reindex_after_removal},
    attrs::{Attribute, Attributes, keys},
    effects::MemoryEffectSet,
    kind::{ConstValue, OpKind, OpTraits},
    module::{IrAllocs, Module},
    op::{OpId, OpUse, Operation, RegionData, RegionId, ValueId},
    print::{fmt_type, print_module},
    symbols::{FuncInfo, ParamInfo, SymbolTable},
    verify::verify_module,
};
