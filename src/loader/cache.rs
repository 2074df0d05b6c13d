//! Protected handle newtype and the module cache.
//!
//! `boa_engine` values are reference-counted (`Gc`) internally rather than
//! requiring explicit V8-style protect/unprotect calls: holding a `JsValue`
//! or `Module` already keeps it alive. `ProtectedHandle` is kept anyway as
//! the typed wrapper the coordination kernel's invariants are stated in
//! terms of (see spec §3, §9) — `protect` is the constructor, dropping (or
//! calling `unprotect`) is the release, and both happen exactly once because
//! the type has no `Clone` impl.

use boa_engine::{JsValue, Module};
use std::collections::{HashMap, HashSet};

pub struct ProtectedHandle<T>(T);

impl<T> ProtectedHandle<T> {
    pub fn protect(value: T) -> Self {
        ProtectedHandle(value)
    }

    pub fn get(&self) -> &T {
        &self.0
    }

    pub fn unprotect(self) -> T {
        self.0
    }
}

pub enum ModuleCacheEntry {
    Cjs(ProtectedHandle<JsValue>),
    Esm(ProtectedHandle<Module>),
}

impl ModuleCacheEntry {
    pub fn as_cjs(&self) -> Option<&JsValue> {
        match self {
            ModuleCacheEntry::Cjs(handle) => Some(handle.get()),
            ModuleCacheEntry::Esm(_) => None,
        }
    }

    pub fn as_esm(&self) -> Option<&Module> {
        match self {
            ModuleCacheEntry::Esm(handle) => Some(handle.get()),
            ModuleCacheEntry::Cjs(_) => None,
        }
    }
}

/// Keyed by canonical path. A path appears at most once (spec §3 invariant);
/// the CJS cache never holds an ESM entry and vice versa, since each path's
/// format is fixed by its extension.
#[derive(Default)]
pub struct ModuleCache {
    entries: HashMap<String, ModuleCacheEntry>,
    loading: HashSet<String>,
    identity_to_path: HashMap<usize, String>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&ModuleCacheEntry> {
        self.entries.get(path)
    }

    pub fn is_loading(&self, path: &str) -> bool {
        self.loading.contains(path)
    }

    pub fn begin_loading(&mut self, path: &str) {
        self.loading.insert(path.to_string());
    }

    pub fn finish_loading(&mut self, path: &str) {
        self.loading.remove(path);
    }

    pub fn insert_cjs(&mut self, path: &str, value: JsValue) {
        self.entries.insert(path.to_string(), ModuleCacheEntry::Cjs(ProtectedHandle::protect(value)));
    }

    pub fn insert_esm(&mut self, path: &str, module: Module) {
        self.entries.insert(path.to_string(), ModuleCacheEntry::Esm(ProtectedHandle::protect(module)));
    }

    /// Record `module_identity -> canonical_path` so the engine's resolve
    /// callback can answer nested imports even when the engine doesn't pass
    /// origin information (spec §9).
    pub fn record_identity(&mut self, identity: usize, path: &str) {
        self.identity_to_path.insert(identity, path.to_string());
    }

    pub fn path_for_identity(&self, identity: usize) -> Option<&str> {
        self.identity_to_path.get(&identity).map(String::as_str)
    }

    /// Unprotects every cached value by dropping it (release before
    /// `clear_caches()`/shutdown, per spec §3 lifecycles).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.loading.clear();
        self.identity_to_path.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::JsValue;

    #[test]
    fn a_path_holds_at_most_one_entry_and_loading_state_clears() {
        let mut cache = ModuleCache::new();
        cache.begin_loading("a.js");
        assert!(cache.is_loading("a.js"));
        cache.insert_cjs("a.js", JsValue::undefined());
        cache.finish_loading("a.js");
        assert!(!cache.is_loading("a.js"));
        assert!(cache.get("a.js").unwrap().as_cjs().is_some());

        cache.insert_cjs("a.js", JsValue::from(1));
        assert_eq!(cache.entries.len(), 1);
    }

    #[test]
    fn clear_drops_every_entry() {
        let mut cache = ModuleCache::new();
        cache.insert_cjs("a.js", JsValue::undefined());
        cache.clear();
        assert!(cache.get("a.js").is_none());
    }
}
