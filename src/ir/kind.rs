//! Operation kinds and their capability records.
//!
//! The engine treats most operations as opaque nodes identified by a symbolic
//! kind; the kinds below are the ones rewrites actually inspect. Capabilities
//! that MLIR would express through interface inheritance (call-like,
//! effect-bearing, aliasing-carrying) are a small per-kind record instead.

use smol_str::SmolStr;

/// Compile-time constant value produced by [`OpKind::Constant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Int { value: i64, width: u32 },
    Index(i64),
    /// Bit pattern of a float constant; kept as bits so constants hash.
    Float { bits: u64, width: u32 },
}

impl ConstValue {
    /// Integer payload of an int or index constant.
    pub fn int_value(self) -> Option<i64> {
        match self {
            ConstValue::Int { value, .. } => Some(value),
            ConstValue::Index(value) => Some(value),
            ConstValue::Float { .. } => None,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            ConstValue::Int { value, .. } => value == 0,
            ConstValue::Index(value) => value == 0,
            ConstValue::Float { bits, .. } => bits == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    Constant(ConstValue),

    // View conversions and address arithmetic.
    /// Reinterpret a raw address as a structured array view.
    ViewFromAddr,
    /// Decay a structured array view back to its raw address.
    AddrFromView,
    /// Type cast between shape-compatible views.
    Cast,
    /// Bit/address-space cast between raw addresses.
    AddrCast,
    /// Pointer arithmetic: base address advanced by `index * elem_size`.
    AddrOffset { elem_size: u64 },

    // Memory access.
    Load,
    Store,
    /// Bulk byte copy: `(dst, src, len, async deps…)`, optional token result.
    MemCopy,
    /// Bulk byte fill with zeroes: `(dst, len)`.
    MemFill,
    Alloc,
    Dealloc,

    // Call-like operations; the callee is a symbol-reference attribute.
    KernelCall,
    JitCall,
    Call,

    Barrier,

    // Structured control flow.
    /// `(cond)`, regions: then, else.
    If,
    /// Regions: before (ends in `Condition`), after.
    While,
    /// `(lower, upper, step)`, one region with the induction variable as its
    /// argument.
    For,
    /// Search-space construct: N candidate regions plus parallel descriptions.
    Alternatives,

    // Terminators.
    Yield,
    Condition,

    // Scalar arithmetic appearing in length/offset expressions.
    Add,
    Mul,
    Div,
    Shl,
    ShrS,
    ShrU,
    ExtS,
    ExtU,
    Trunc,
    IndexCast,

    /// Front-end operation the engine does not inspect.
    Opaque(SmolStr),
}

/// Capability record for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpTraits {
    pub is_call: bool,
    pub has_aliasing: bool,
    pub has_effects: bool,
    pub is_terminator: bool,
}

impl OpKind {
    pub fn traits(&self) -> OpTraits {
        use OpKind::*;
        match self {
            KernelCall | JitCall => OpTraits {
                is_call: true,
                has_aliasing: true,
                has_effects: true,
                ..Default::default()
            },
            Call => OpTraits { is_call: true, has_effects: true, ..Default::default() },
            Load | Store | MemCopy | MemFill | Alloc | Dealloc | Barrier | Opaque(_) => {
                OpTraits { has_effects: true, ..Default::default() }
            }
            Yield | Condition => OpTraits { is_terminator: true, ..Default::default() },
            _ => OpTraits::default(),
        }
    }

    pub fn name(&self) -> &str {
        use OpKind::*;
        match self {
            Constant(_) => "constant",
            ViewFromAddr => "view_from_addr",
            AddrFromView => "addr_from_view",
            Cast => "cast",
            AddrCast => "addr_cast",
            AddrOffset { .. } => "addr_offset",
            Load => "load",
            Store => "store",
            MemCopy => "mem_copy",
            MemFill => "mem_fill",
            Alloc => "alloc",
            Dealloc => "dealloc",
            KernelCall => "kernel_call",
            JitCall => "jit_call",
            Call => "call",
            Barrier => "barrier",
            If => "if",
            While => "while",
            For => "for",
            Alternatives => "alternatives",
            Yield => "yield",
            Condition => "condition",
            Add => "add",
            Mul => "mul",
            Div => "div",
            Shl => "shl",
            ShrS => "shr_s",
            ShrU => "shr_u",
            ExtS => "ext_s",
            ExtU => "ext_u",
            Trunc => "trunc",
            IndexCast => "index_cast",
            Opaque(name) => name.as_str(),
        }
    }

    pub fn is_launch(&self) -> bool {
        matches!(self, OpKind::KernelCall | OpKind::JitCall)
    }
}
