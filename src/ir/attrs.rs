//! String-keyed operation attributes.
//!
//! Insertion order is preserved so printing stays deterministic.

use smol_str::SmolStr;

use super::{alias::ResultAlias, effects::MemoryEffectSet};

/// Well-known attribute keys.
pub mod keys {
    /// Symbol reference held by call-like operations.
    pub const CALLEE: &str = "callee";
    /// Explicit memory-effect list on a call-like or opaque operation,
    /// overriding the callee declaration (or the all-effects default).
    pub const MEMORY_EFFECTS: &str = "memory_effects";
    /// Result-aliasing descriptor list on launch operations.
    pub const OUTPUT_ALIASES: &str = "output_operand_aliases";
    /// Per-candidate descriptions on an alternatives group.
    pub const ALTERNATIVE_DESCS: &str = "alternatives.descs";
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Bool(bool),
    Int(i64),
    Str(SmolStr),
    Symbol(SmolStr),
    StrList(Vec<SmolStr>),
    IntList(Vec<i64>),
    Effects(MemoryEffectSet),
    Aliases(Vec<ResultAlias>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(SmolStr, Attribute)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: impl Into<SmolStr>, value: Attribute) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Attribute> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Attribute)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Typed accessors for the well-known keys.

    pub fn symbol(&self, key: &str) -> Option<&SmolStr> {
        match self.get(key)? {
            Attribute::Symbol(name) | Attribute::Str(name) => Some(name),
            _ => None,
        }
    }

    pub fn aliases(&self) -> Option<&[ResultAlias]> {
        match self.get(keys::OUTPUT_ALIASES)? {
            Attribute::Aliases(list) => Some(list),
            _ => None,
        }
    }

    pub fn str_list(&self, key: &str) -> Option<&[SmolStr]> {
        match self.get(key)? {
            Attribute::StrList(list) => Some(list),
            _ => None,
        }
    }

    pub fn effects(&self) -> Option<MemoryEffectSet> {
        match self.get(keys::MEMORY_EFFECTS)? {
            Attribute::Effects(set) => Some(*set),
            _ => None,
        }
    }
}

impl FromIterator<(SmolStr, Attribute)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (SmolStr, Attribute)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}
