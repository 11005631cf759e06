//! Value types: scalars, raw addresses and structured array views.
//!
//! Types are plain inline values (clone, compare, hash) rather than interned
//! handles; the type grammar here is small enough that a context indirection
//! buys nothing.

use smallvec::SmallVec;

/// Address-space tag carried by raw addresses and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddrSpace(pub u32);

impl AddrSpace {
    pub const GENERIC: AddrSpace = AddrSpace(0);
    pub const SHARED: AddrSpace = AddrSpace(3);
}

/// One dimension of a view shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Fixed(u64),
    Dynamic,
}

impl Dim {
    pub fn as_fixed(self) -> Option<u64> {
        match self {
            Dim::Fixed(n) => Some(n),
            Dim::Dynamic => None,
        }
    }
}

/// Memory layout of a view. Only the identity (row-major, densely packed)
/// layout participates in rewrites; anything else blocks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    #[default]
    Identity,
    Opaque,
}

/// A structured, typed reinterpretation of a raw address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewType {
    pub elem: Type,
    pub dims: SmallVec<[Dim; 4]>,
    pub space: AddrSpace,
    pub layout: Layout,
}

impl ViewType {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Shape compatibility: ranks match and all but possibly the leading
    /// dimension agree.
    pub fn shape_compatible(&self, other: &ViewType) -> bool {
        self.rank() == other.rank() && self.dims.iter().zip(&other.dims).skip(1).all(|(a, b)| a == b)
    }

    /// Byte width of one "row": element size times the product of all
    /// trailing (non-leading) dimensions. `None` if any trailing dimension is
    /// dynamic, the element has no byte size, or the product overflows.
    pub fn row_byte_width(&self) -> Option<u64> {
        let mut width = self.elem.byte_size()?;
        for dim in self.dims.iter().skip(1) {
            width = width.checked_mul(dim.as_fixed()?)?;
        }
        Some(width)
    }

    /// Trailing dimensions as fixed bounds, for loop-nest generation.
    pub fn trailing_bounds(&self) -> Option<Vec<u64>> {
        self.dims.iter().skip(1).map(|d| d.as_fixed()).collect()
    }

    /// The same view reinterpreted with a new element type and an
    /// unknown-length trailing dimension.
    pub fn with_elem_dynamic_tail(&self, elem: Type) -> ViewType {
        let mut dims = self.dims.clone();
        if let Some(last) = dims.last_mut() {
            *last = Dim::Dynamic;
        }
        ViewType { elem, dims, space: self.space, layout: self.layout }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Signless integer of the given bit width.
    Int(u32),
    /// IEEE float of the given bit width.
    Float(u32),
    /// Target-word index type.
    Index,
    /// Asynchronous completion token.
    Token,
    /// Raw address in the given address space.
    Addr(AddrSpace),
    /// Structured array view.
    View(Box<ViewType>),
}

impl Type {
    pub fn view(elem: Type, dims: impl IntoIterator<Item = Dim>, space: AddrSpace) -> Type {
        Type::View(Box::new(ViewType {
            elem,
            dims: dims.into_iter().collect(),
            space,
            layout: Layout::Identity,
        }))
    }

    pub fn as_view(&self) -> Option<&ViewType> {
        match self {
            Type::View(v) => Some(v),
            _ => None,
        }
    }

    pub fn addr_space(&self) -> Option<AddrSpace> {
        match self {
            Type::Addr(space) => Some(*space),
            Type::View(v) => Some(v.space),
            _ => None,
        }
    }

    pub fn is_addr(&self) -> bool {
        matches!(self, Type::Addr(_))
    }

    /// Byte size of a scalar type. `None` for non-scalars and sub-byte widths.
    pub fn byte_size(&self) -> Option<u64> {
        match self {
            Type::Int(bits) | Type::Float(bits) if bits % 8 == 0 && *bits > 0 => {
                Some(u64::from(*bits) / 8)
            }
            Type::Index => Some(8),
            _ => None,
        }
    }

    /// Single-byte-granularity elements are the re-viewable side of a
    /// heterogeneous copy.
    pub fn is_byte(&self) -> bool {
        matches!(self, Type::Int(8))
    }
}
