//! Memory-effect sets attached to call-like operations.
//!
//! Effects are either explicit (attribute present on the callee) or implicit:
//! an absent attribute conservatively means all four effects.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryEffectSet: u8 {
        const ALLOCATE = 1 << 0;
        const FREE     = 1 << 1;
        const READ     = 1 << 2;
        const WRITE    = 1 << 3;
    }
}

impl MemoryEffectSet {
    /// The implicit effect set for a callee without an effects attribute.
    pub fn all_effects() -> Self {
        Self::ALLOCATE | Self::FREE | Self::READ | Self::WRITE
    }

    /// An operation is read-none when it has no observable memory effect.
    pub fn is_read_none(self) -> bool {
        self.is_empty()
    }

    /// Named differently from the `bitflags`-generated `from_name`, which
    /// expects the `SCREAMING_CASE` flag identifiers.
    pub fn effect_from_name(name: &str) -> Option<Self> {
        match name {
            "allocate" => Some(Self::ALLOCATE),
            "free" => Some(Self::FREE),
            "read" => Some(Self::READ),
            "write" => Some(Self::WRITE),
            _ => None,
        }
    }

    pub fn names(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Self::ALLOCATE) {
            out.push("allocate");
        }
        if self.contains(Self::FREE) {
            out.push("free");
        }
        if self.contains(Self::READ) {
            out.push("read");
        }
        if self.contains(Self::WRITE) {
            out.push("write");
        }
        out
    }
}
