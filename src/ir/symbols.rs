//! Module-level symbol table for function-like entities.
//!
//! Call-like operations hold a symbol reference; resolving it is mandatory
//! before any rewrite that inspects callee properties. The callee bodies
//! themselves are external — the front end supplies per-parameter liveness
//! and read-only markers along with the signature.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::{
    error::{Error, Result},
    typing::Type,
};

use super::effects::MemoryEffectSet;

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub ty: Type,
    /// Parameter carries an explicit read-only marker.
    pub readonly: bool,
    /// Parameter carries an explicit read-none marker.
    pub readnone: bool,
    /// Parameter has at least one use inside the callee body.
    pub used: bool,
}

impl ParamInfo {
    pub fn new(ty: Type) -> Self {
        Self { ty, readonly: false, readnone: false, used: true }
    }

    /// The callee provably never mutates memory reachable through this
    /// parameter: it is unused, or explicitly read-only/read-none.
    pub fn never_mutated(&self) -> bool {
        !self.used || self.readonly || self.readnone
    }
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: SmolStr,
    pub params: Vec<ParamInfo>,
    /// Explicit memory-effect attribute; `None` means the implicit
    /// conservative all-effects set.
    pub effects: Option<MemoryEffectSet>,
}

impl FuncInfo {
    pub fn new(name: impl Into<SmolStr>, params: Vec<ParamInfo>) -> Self {
        Self { name: name.into(), params, effects: None }
    }

    pub fn effect_set(&self) -> MemoryEffectSet {
        self.effects.unwrap_or_else(MemoryEffectSet::all_effects)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    map: HashMap<SmolStr, FuncInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a symbol; returns false if the name is already taken.
    pub fn define(&mut self, info: FuncInfo) -> bool {
        if self.map.contains_key(&info.name) {
            return false;
        }
        self.map.insert(info.name.clone(), info);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&FuncInfo> {
        self.map.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&FuncInfo> {
        self.map.get(name).ok_or_else(|| Error::UnresolvedSymbol { name: name.into() })
    }

    pub fn resolve_mut(&mut self, name: &str) -> Result<&mut FuncInfo> {
        self.map.get_mut(name).ok_or_else(|| Error::UnresolvedSymbol { name: name.into() })
    }

    pub fn remove(&mut self, name: &str) -> Option<FuncInfo> {
        self.map.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_failure_is_an_error() {
        let mut table = SymbolTable::new();
        assert!(table.define(FuncInfo::new("kernel", vec![])));
        assert!(!table.define(FuncInfo::new("kernel", vec![])));

        assert!(table.resolve("kernel").is_ok());
        assert_eq!(
            table.resolve("missing").unwrap_err(),
            Error::UnresolvedSymbol { name: "missing".into() }
        );
    }

    #[test]
    fn never_mutated_markers() {
        let ty = Type::Addr(crate::typing::AddrSpace::GENERIC);
        let mut p = ParamInfo::new(ty);
        assert!(!p.never_mutated());
        p.readonly = true;
        assert!(p.never_mutated());
        p.readonly = false;
        p.used = false;
        assert!(p.never_mutated());
    }
}
