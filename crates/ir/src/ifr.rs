//! Internal function resolution.
//!
//! Translators may emit calls to named helper routines (`handle_poison`,
//! CPU-state callbacks). The resolver maps those names to link symbols and,
//! for JIT use, to concrete entry addresses. The set of registered helpers
//! is fixed before translation begins; resolution never mutates.

use crate::entity::{entity_ref, PrimaryMap};
use rustc_hash::FxHashMap;

/// An opaque reference to a registered helper function.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct InternalFunction(u32);
entity_ref!(InternalFunction, "fn");

/// Name of the helper invoked for instructions without a translator.
pub const HANDLE_POISON: &str = "handle_poison";

struct FunctionData {
    name: String,
    symbol: String,
    address: u64,
}

/// Maps helper names to link symbols and entry addresses.
pub struct InternalFunctionResolver {
    funcs: PrimaryMap<InternalFunction, FunctionData>,
    by_name: FxHashMap<String, InternalFunction>,
}

impl InternalFunctionResolver {
    pub fn new() -> Self {
        Self {
            funcs: PrimaryMap::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Register a helper under `name`. The link symbol is the name with a
    /// `magpie_` prefix; `address` is the JIT entry point (zero for
    /// static-only use, where the symbol is resolved by the linker).
    pub fn register(&mut self, name: &str, address: u64) -> InternalFunction {
        debug_assert!(!self.by_name.contains_key(name), "duplicate helper {name}");
        let f = self.funcs.push(FunctionData {
            name: name.to_string(),
            symbol: format!("magpie_{name}"),
            address,
        });
        self.by_name.insert(name.to_string(), f);
        f
    }

    /// Resolve a helper by name.
    pub fn resolve(&self, name: &str) -> Option<InternalFunction> {
        self.by_name.get(name).copied()
    }

    /// The registered name of `f`.
    pub fn name(&self, f: InternalFunction) -> &str {
        &self.funcs[f].name
    }

    /// The link symbol of `f`.
    pub fn symbol(&self, f: InternalFunction) -> &str {
        &self.funcs[f].symbol
    }

    /// The JIT entry address of `f`.
    pub fn address(&self, f: InternalFunction) -> u64 {
        self.funcs[f].address
    }
}

impl Default for InternalFunctionResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let mut ifr = InternalFunctionResolver::new();
        let f = ifr.register(HANDLE_POISON, 0x1234);
        assert_eq!(ifr.resolve("handle_poison"), Some(f));
        assert_eq!(ifr.resolve("nonesuch"), None);
        assert_eq!(ifr.symbol(f), "magpie_handle_poison");
        assert_eq!(ifr.address(f), 0x1234);
    }
}
