//! Ties the coordination kernel together: VFS, resolver/loader, engine,
//! scheduler, reactor and Web API surface, behind the operations `main.rs`
//! drives (`load_script`, `run`, `reload_script`, `quit`).
//!
//! Grounded on `jhead-bevy-react`'s top-level wiring in `js/engine.rs`
//! (`run_js_loop`'s setup sequence: construct VFS-equivalent state, build
//! the engine, register extensions, evaluate the entry point) reorganized
//! around `scheduler::Scheduler` instead of a worker-thread loop.

use crate::config::RuntimeConfig;
use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::io::Reactor;
use crate::loader::ModuleLoader;
use crate::scheduler::{NoWindow, Scheduler, WindowSource};
use crate::vfs::{bundle::normalize_path, Vfs};
use crate::webapi;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

/// External collaborator (spec §1/§6 Non-goals: windowing and GPU
/// presentation are out of scope). `--screenshot` with no concrete backend
/// registered logs and exits 1 rather than panicking.
pub trait ScreenshotSink {
    fn save_screenshot(&mut self, path: &Path) -> std::io::Result<()>;
}

/// The screenshot sink used when no window backend is wired in: every
/// capture fails, matching spec §6's "without a window backend present,
/// logs and exits 1" behavior.
pub struct NoScreenshotSink;
impl ScreenshotSink for NoScreenshotSink {
    fn save_screenshot(&mut self, _path: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no screenshot backend is configured"))
    }
}

pub struct Runtime {
    pub scheduler: Scheduler,
    entry_path: String,
    root: PathBuf,
    watch: bool,
}

impl Runtime {
    /// Builds every collaborator and loads `entry` as the program's entry
    /// module. `root` is the directory bundle/module paths are computed
    /// relative to (normally `entry`'s parent directory).
    ///
    /// Two `Vfs` instances are constructed over the same root: one
    /// `Rc`-wrapped for the module loader's single-threaded use, one
    /// `Arc`-wrapped for the reactor's background file reads. `Vfs::discover`
    /// is a read-only bundle/filesystem probe, so doing it twice has no
    /// observable difference from sharing one instance behind two pointer
    /// types would.
    pub fn launch(config: &RuntimeConfig, entry: &Path, window: Box<dyn WindowSource>) -> Result<Self, RuntimeError> {
        let root = entry.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

        let vfs_for_loader = Rc::new(Vfs::discover(root.clone(), config.bundle_override.clone()));
        let vfs_for_reactor = Arc::new(Vfs::discover(root.clone(), config.bundle_override.clone()));

        let entry_name = entry.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let entry_path = vfs_for_loader.entry_script().unwrap_or_else(|| normalize_path(&entry_name));

        let loader = ModuleLoader::new(vfs_for_loader);
        let engine = Engine::new(Rc::clone(&loader)).map_err(|e| RuntimeError::EngineInit(e.to_string()))?;
        let reactor = Reactor::new()?;

        let mut scheduler = Scheduler::new(engine, reactor, window);
        webapi::register(&mut scheduler.engine.context, &scheduler.state, &loader, &vfs_for_reactor)
            .map_err(|e| RuntimeError::EngineInit(e.to_string()))?;

        loader
            .load_entry(&entry_path, &mut scheduler.engine.context)
            .map_err(|e| RuntimeError::ScriptLoad { path: entry_path.clone(), message: e.to_string() })?;
        // The entry script's own microtasks (e.g. an already-settled Promise
        // reaction) must observe completion before the scheduler's first
        // `poll_once` checks any timer (spec §8 E5: `c`, `b`, `a` — the
        // top-level script runs to completion, then its microtask queue
        // drains, before the first timer-fired check).
        scheduler.engine.flush_microtasks();

        let mut runtime = Runtime { scheduler, entry_path, root, watch: config.watch };
        if config.watch {
            runtime.arm_hot_reload();
        }

        Ok(runtime)
    }

    fn arm_hot_reload(&mut self) {
        let watch_path = self.root.join(&self.entry_path).to_string_lossy().into_owned();
        let mut state = self.scheduler.state.borrow_mut();
        match state.reactor.watch(watch_path) {
            Ok(watch_id) => state.set_reload_watch_id(watch_id),
            Err(e) => log::warn!("could not watch '{}' for hot reload: {e}", self.entry_path),
        }
    }

    /// Re-evaluates the entry module after `scheduler::Scheduler`'s reload
    /// step has already cleared timers/RAF/caches (spec §4.5 step 6).
    pub fn reload_script(&mut self) -> Result<(), RuntimeError> {
        let loader = Rc::clone(&self.scheduler.engine.loader);
        loader
            .load_entry(&self.entry_path, &mut self.scheduler.engine.context)
            .map_err(|e| RuntimeError::ScriptLoad { path: self.entry_path.clone(), message: e.to_string() })?;
        self.scheduler.engine.flush_microtasks();
        Ok(())
    }

    /// Drives `poll_once` until quit (or, with no window, three idle
    /// iterations), reloading the entry script whenever the hot-reload watch
    /// fires.
    pub fn run(&mut self, no_window: bool) {
        let mut idle_streak = 0;
        loop {
            if self.scheduler.state.borrow().quit() {
                break;
            }
            let did_work = self.scheduler.poll_once();
            if self.watch && self.scheduler.state.borrow_mut().take_entry_reload() {
                if let Err(e) = self.reload_script() {
                    log::error!("hot reload failed: {e}");
                }
            }
            if no_window {
                if did_work {
                    idle_streak = 0;
                } else {
                    idle_streak += 1;
                    if idle_streak >= 3 {
                        break;
                    }
                }
            }
        }
        self.scheduler.shutdown();
    }

    pub fn quit(&mut self) {
        self.scheduler.state.borrow_mut().request_quit();
    }
}

/// Runs `frames` iterations of `poll_once`, then hands the render target to
/// `sink`. Used by `--screenshot`; exits the process with code 1 (spec §6)
/// when no concrete sink is wired in and a capture is attempted.
pub fn run_screenshot_mode(runtime: &mut Runtime, frames: u32, output: &Path, sink: &mut dyn ScreenshotSink) -> Result<(), RuntimeError> {
    for _ in 0..frames {
        runtime.scheduler.poll_once();
    }
    sink.save_screenshot(output).map_err(|source| RuntimeError::Screenshot { path: output.to_string_lossy().into_owned(), source })
}

/// A `WindowSource` for `--no-sdl` runs; re-exported so `main.rs` doesn't
/// need to reach into `scheduler` directly for the common case.
pub fn headless_window() -> Box<dyn WindowSource> {
    Box::new(NoWindow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn launching_loads_and_evaluates_the_entry_script() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "globalThis.__ran = true;").unwrap();

        let config = RuntimeConfig::default();
        let mut runtime = Runtime::launch(&config, &dir.path().join("main.js"), headless_window()).unwrap();
        let ran = runtime.scheduler.engine.eval("globalThis.__ran").unwrap();
        assert!(ran.to_boolean());
    }

    #[test]
    fn no_window_run_terminates_on_an_idle_script() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "1;").unwrap();

        let config = RuntimeConfig::default();
        let mut runtime = Runtime::launch(&config, &dir.path().join("main.js"), headless_window()).unwrap();
        runtime.run(true);
    }

    #[test]
    fn quit_stops_a_windowed_run_immediately() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.js"), "1;").unwrap();

        let config = RuntimeConfig::default();
        let mut runtime = Runtime::launch(&config, &dir.path().join("main.js"), headless_window()).unwrap();
        runtime.quit();
        runtime.run(false);
    }
}
