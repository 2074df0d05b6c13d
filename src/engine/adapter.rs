//! The script engine capability set (spec §4.4): owns the `boa_engine`
//! `Context` directly on the single engine/main thread.
//!
//! Grounded on `jhead-bevy-react`'s `js/engine.rs` `run_js_loop` for
//! `Context` construction and `boa_runtime` extension registration, but
//! drops the worker-thread + `JsCommand` channel indirection entirely: that
//! plumbing exists only to bridge a Bevy ECS thread to the JS thread, and
//! this runtime has no such second thread to bridge (spec §5: the engine
//! thread runs `Scheduler::poll_once()` directly).

use crate::loader::ModuleLoader;
use boa_engine::module::{ModuleLoader as BoaModuleLoader, Referrer};
use boa_engine::{Context, JsError, JsNativeError, JsObject, JsResult, JsString, Module, Source};
use boa_runtime::extensions::{ConsoleExtension, MicrotaskExtension, TimeoutExtension, UrlExtension};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Bridges `boa_engine`'s native ESM resolution to our VFS-backed resolver,
/// per spec §4.3 ("native ESM is primary; textual transform is the
/// CJS-interop fallback").
struct VfsModuleLoader {
    loader: Rc<ModuleLoader>,
}

impl BoaModuleLoader for VfsModuleLoader {
    fn init_import_meta(self: Rc<Self>, import_meta: &JsObject, module: &Module, context: &mut Context) {
        if let Some(path) = module.path() {
            let _ = import_meta.set(
                JsString::from("url"),
                JsString::from(path.to_string_lossy().as_ref()),
                false,
                context,
            );
        }
    }

    async fn load_imported_module(
        self: Rc<Self>,
        referrer: Referrer,
        specifier: boa_engine::JsString,
        context: &RefCell<&mut Context>,
    ) -> JsResult<Module> {
        let referrer_path = referrer.path().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let specifier_str = specifier.to_std_string_escaped();

        let resolved = self
            .loader
            .resolve_for_import(&specifier_str, &referrer_path)
            .map_err(|e| JsError::from_native(JsNativeError::typ().with_message(e.to_string())))?;

        // Cache hit: every importer of the same canonical path must share
        // one `Module` instance (the JS module-singleton contract), not get
        // an independently re-evaluated copy.
        if let Some(module) = self.loader.cached_esm(&resolved.path) {
            return Ok(module);
        }

        let (source_text, path) = self
            .loader
            .esm_source(&resolved)
            .map_err(|e| JsError::from_native(JsNativeError::error().with_message(e.to_string())))?;

        let src = Source::from_bytes(source_text.as_bytes()).with_path(Path::new(&path));
        let module = Module::parse(src, None, &mut context.borrow_mut())?;
        self.loader.record_module_identity(module_identity(&module), &path);
        self.loader.insert_esm(&path, module.clone());
        Ok(module)
    }
}

fn module_identity(module: &Module) -> usize {
    // `Module` clones are reference-counted; its address stands in for
    // identity within one `Context`'s lifetime.
    module as *const Module as usize
}

/// Owns the engine context and the module loader it was built with. Lives
/// for the whole run; `scheduler::Scheduler` drives it one `poll_once` at a
/// time.
pub struct Engine {
    pub context: Context,
    pub loader: Rc<ModuleLoader>,
}

impl Engine {
    pub fn new(loader: Rc<ModuleLoader>) -> JsResult<Self> {
        let module_loader = Rc::new(VfsModuleLoader { loader: Rc::clone(&loader) });
        let mut context = Context::builder()
            .module_loader(module_loader)
            .build()
            .map_err(|e| JsError::from_native(JsNativeError::error().with_message(format!("failed to construct engine: {e}"))))?;

        boa_runtime::register(
            (ConsoleExtension::default(), TimeoutExtension {}, MicrotaskExtension {}, UrlExtension {}),
            None,
            &mut context,
        )
        .map_err(|e| JsError::from_native(JsNativeError::error().with_message(format!("failed to register runtime extensions: {e:?}"))))?;

        Ok(Engine { context, loader })
    }

    /// Runs the engine's microtask queue until empty (spec §4.5 step 9).
    pub fn flush_microtasks(&mut self) {
        self.context.run_jobs();
    }

    /// Evaluates `source` as a plain script in the global scope (used for
    /// evaluating the textually-transformed CJS wrapper, and for ad hoc
    /// `eval_script` calls from `runtime::Runtime`).
    pub fn eval(&mut self, source: &str) -> JsResult<boa_engine::JsValue> {
        self.context.eval(Source::from_bytes(source.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Vfs;

    #[test]
    fn construction_registers_console_without_panicking() {
        let vfs = Rc::new(Vfs::filesystem_only(std::env::temp_dir()));
        let loader = ModuleLoader::new(vfs);
        let mut engine = Engine::new(loader).unwrap();
        let result = engine.eval("typeof console.log").unwrap();
        assert_eq!(result.to_string(&mut engine.context).unwrap().to_std_string_escaped(), "function");
    }
}
