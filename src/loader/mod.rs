//! Module loader: read, transpile, wrap, evaluate, cache (spec §4.3).
//!
//! Grounded on `jhead-bevy-react`'s `js/esm.rs` `FetchModuleLoader` — the
//! `Rc<Self>` + interior-mutability shape that lets a loader be captured by
//! native closures registered into the engine, generalized from
//! HTTP-fetched ESM modules to VFS-backed CJS/ESM/JSON modules.

pub mod cache;
pub mod esm_transform;

use crate::error::LoaderError;
use crate::resolver::{ModuleFormat, ModuleResolver, ResolveMode, ResolvedModule};
use crate::vfs::Vfs;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Module, NativeFunction, Source};
use boa_gc::{Finalize, Trace, empty_trace};
use cache::ModuleCache;
use std::cell::RefCell;
use std::rc::Rc;

/// Marks the `require` closure's captures (an `Rc<ModuleLoader>` and a
/// referrer path) as containing no `boa_gc`-managed pointers, so they can be
/// handed to `NativeFunction::from_copy_closure_with_captures` without the
/// GC tracing that type otherwise demands.
struct NonGc<T>(T);

impl<T> Finalize for NonGc<T> {}
// SAFETY: `T` here is always plain Rust host state, never a value
// containing `boa_gc`-managed pointers.
unsafe impl<T> Trace for NonGc<T> {
    empty_trace!();
}

/// Owns the VFS, resolver and module cache for one runtime instance. Shared
/// as `Rc<ModuleLoader>` so the `require` native closure registered into the
/// engine can hold its own clone without borrowing the context.
pub struct ModuleLoader {
    vfs: Rc<Vfs>,
    resolver: ModuleResolver,
    cache: RefCell<ModuleCache>,
}

impl ModuleLoader {
    pub fn new(vfs: Rc<Vfs>) -> Rc<Self> {
        Rc::new(ModuleLoader { vfs, resolver: ModuleResolver::new(), cache: RefCell::new(ModuleCache::new()) })
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Resolves `path` as a Require specifier relative to the VFS root, then
    /// loads it as the entry module.
    pub fn load_entry(self: &Rc<Self>, path: &str, context: &mut Context) -> JsResult<JsValue> {
        self.require(path, "", context)
    }

    /// Synchronous `require`: returns CJS exports or throws.
    pub fn require(self: &Rc<Self>, specifier: &str, referrer: &str, context: &mut Context) -> JsResult<JsValue> {
        let resolved = self
            .resolver
            .resolve(&self.vfs, specifier, referrer, ResolveMode::Require)
            .map_err(|e| JsError::from_native(JsNativeError::typ().with_message(e.to_string())))?;

        self.require_resolved(resolved, context)
    }

    fn require_resolved(self: &Rc<Self>, resolved: ResolvedModule, context: &mut Context) -> JsResult<JsValue> {
        let path = resolved.path.clone();

        // Covers both a plain cache hit and a circular `require` re-entering
        // a module that's still mid-evaluation: the placeholder CJS entry
        // inserted below (before the wrapper function ever runs) is already
        // in the cache by the time any JS a cycle could run gets a chance to
        // call `require` on this same path again, so this one check serves
        // both cases (spec §3's partial-exports invariant).
        if let Some(entry) = self.cache.borrow().get(&path) {
            if let Some(value) = entry.as_cjs() {
                return Ok(value.clone());
            }
        }

        self.cache.borrow_mut().begin_loading(&path);

        let bytes = self
            .vfs
            .read(&path)
            .map_err(LoaderError::from)
            .map_err(|e| JsError::from_native(JsNativeError::error().with_message(e.to_string())))?;
        let source_text = String::from_utf8_lossy(&bytes).into_owned();

        let body = match resolved.format {
            ModuleFormat::Json => format!("module.exports = {source_text};"),
            ModuleFormat::Cjs => source_text,
            ModuleFormat::Esm => esm_transform::transform(&source_text),
        };

        let module_obj = JsObject::with_object_proto(context.intrinsics());
        let exports_placeholder = JsObject::with_object_proto(context.intrinsics());
        module_obj.set(JsString::from("exports"), exports_placeholder.clone(), true, context)?;
        self.cache.borrow_mut().insert_cjs(&path, exports_placeholder.clone().into());

        let dirname = dirname_of(&path);
        let require_fn = self.make_require_closure(path.clone(), context);

        let wrapper_src = format!(
            "(function(exports, require, module, __filename, __dirname) {{ 'use strict';\n{body}\n}})"
        );
        let wrapper = context.eval(Source::from_bytes(wrapper_src.as_bytes()))?;
        let wrapper_fn = wrapper
            .as_callable()
            .ok_or_else(|| JsError::from_native(JsNativeError::typ().with_message(format!("module {path} did not evaluate to a function"))))?;

        let args = [
            exports_placeholder.clone().into(),
            require_fn,
            module_obj.clone().into(),
            JsValue::from(JsString::from(path.as_str())),
            JsValue::from(JsString::from(dirname.as_str())),
        ];

        let eval_result = wrapper_fn.call(&JsValue::undefined(), &args, context);

        self.cache.borrow_mut().finish_loading(&path);

        eval_result?;

        // If the module replaced `module.exports` wholesale, re-protect the
        // new value in place of the placeholder (spec §4.3).
        let final_exports = module_obj.get(JsString::from("exports"), context)?;
        self.cache.borrow_mut().insert_cjs(&path, final_exports.clone());

        Ok(final_exports)
    }

    fn make_require_closure(self: &Rc<Self>, referrer: String, context: &mut Context) -> JsValue {
        let captures = (Rc::clone(self), referrer);
        let native = NativeFunction::from_copy_closure_with_captures(
            |_this: &JsValue, args: &[JsValue], captures: &NonGc<(Rc<ModuleLoader>, String)>, context: &mut Context| {
                let (loader, referrer) = &captures.0;
                let specifier = args
                    .first()
                    .cloned()
                    .unwrap_or(JsValue::undefined())
                    .to_string(context)?
                    .to_std_string_escaped();
                loader.require(&specifier, referrer, context)
            },
            NonGc(captures),
        );
        FunctionObjectBuilder::new(context.realm(), native).build().into()
    }

    /// Used by the engine's ESM loader callback: resolves under Import mode
    /// without reading the source.
    pub fn resolve_for_import(&self, specifier: &str, referrer: &str) -> Result<ResolvedModule, LoaderError> {
        self.resolver.resolve(&self.vfs, specifier, referrer, ResolveMode::Import).map_err(LoaderError::from)
    }

    /// Reads the source text for a module already resolved under Import
    /// mode, for handoff to the engine's native ESM machinery.
    pub fn esm_source(&self, resolved: &ResolvedModule) -> Result<(String, String), LoaderError> {
        let bytes = self.vfs.read(&resolved.path)?;
        let source = String::from_utf8_lossy(&bytes).into_owned();
        Ok((source, resolved.path.clone()))
    }

    /// Cache lookup for the engine's native-ESM loader callback, keyed by
    /// canonical path: two importers of the same specifier must observe the
    /// same `Module` instance, matching the teacher's `FetchModuleLoader`
    /// (`examples/jhead-bevy-react`'s `js/esm.rs`) checking
    /// `local_modules.borrow().get(...)` before parsing.
    pub fn cached_esm(&self, path: &str) -> Option<Module> {
        self.cache.borrow().get(path).and_then(|entry| entry.as_esm()).cloned()
    }

    /// Inserts a freshly parsed ESM module into the cache, mirroring the
    /// teacher's `insert(...)` call after a cache miss.
    pub fn insert_esm(&self, path: &str, module: Module) {
        self.cache.borrow_mut().insert_esm(path, module);
    }

    pub fn record_module_identity(&self, identity: usize, path: &str) {
        self.cache.borrow_mut().record_identity(identity, path);
    }

    pub fn path_for_identity(&self, identity: usize) -> Option<String> {
        self.cache.borrow().path_for_identity(identity).map(str::to_string)
    }

    /// Drops every cached CJS/ESM value (spec §3 lifecycle: "until
    /// `clear_caches()`"), used by the scheduler's reload step.
    pub fn clear_caches(&self) {
        self.cache.borrow_mut().clear();
    }
}

fn dirname_of(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &std::path::Path, rel: &str, content: &str) {
        let full = dir.join(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    #[test]
    fn e1_require_returns_module_exports_field() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.js", "module.exports = require('./b').x + 1;");
        write(dir.path(), "b.js", "module.exports = { x: 41 };");
        let vfs = Rc::new(Vfs::filesystem_only(dir.path()));
        let loader = ModuleLoader::new(vfs);
        let mut context = Context::default();
        let result = loader.load_entry("a.js", &mut context).unwrap();
        assert_eq!(result.to_number(&mut context).unwrap(), 42.0);
    }

    #[test]
    fn e3_partial_exports_are_observed_mid_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.js",
            "module.exports.v = 1; require('./b'); module.exports.v = 2; module.exports.seen = globalThis.__seen;",
        );
        write(dir.path(), "b.js", "globalThis.__seen = require('./a').v;");
        let vfs = Rc::new(Vfs::filesystem_only(dir.path()));
        let loader = ModuleLoader::new(vfs);
        let mut context = Context::default();
        let result = loader.load_entry("a.js", &mut context).unwrap();
        let seen = result.as_object().unwrap().get(JsString::from("seen"), &mut context).unwrap();
        assert_eq!(seen.to_number(&mut context).unwrap(), 1.0);
    }

    #[test]
    fn circular_require_returns_the_placeholder_not_undefined() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.js",
            "globalThis.__mid = require('./b'); module.exports.done = true;",
        );
        write(dir.path(), "b.js", "module.exports = require('./a');");
        let vfs = Rc::new(Vfs::filesystem_only(dir.path()));
        let loader = ModuleLoader::new(vfs);
        let mut context = Context::default();
        let result = loader.load_entry("a.js", &mut context).unwrap();

        let mid = context.eval(Source::from_bytes(b"globalThis.__mid")).unwrap();
        assert!(mid.is_object(), "re-entrant require('./a') mid-cycle must see the placeholder object, not undefined");
        assert!(mid.strict_equals(&result), "the placeholder observed mid-cycle must be the same object that module.exports ends up as");
    }

    #[test]
    fn idempotent_require_returns_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.js", "module.exports = { v: {} };");
        let vfs = Rc::new(Vfs::filesystem_only(dir.path()));
        let loader = ModuleLoader::new(vfs);
        let mut context = Context::default();
        let first = loader.require("./a.js", "", &mut context).unwrap();
        let second = loader.require("./a.js", "", &mut context).unwrap();
        assert!(first.strict_equals(&second));
    }

    #[test]
    fn json_module_round_trips_through_cjs_wrapping() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data.json", r#"{"a": 1}"#);
        let vfs = Rc::new(Vfs::filesystem_only(dir.path()));
        let loader = ModuleLoader::new(vfs);
        let mut context = Context::default();
        let result = loader.require("./data.json", "", &mut context).unwrap();
        let a = result.as_object().unwrap().get(JsString::from("a"), &mut context).unwrap();
        assert_eq!(a.to_number(&mut context).unwrap(), 1.0);
    }
}
