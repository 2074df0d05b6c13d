//! The scheduler (spec §4.5): `poll_once()`'s eleven ordered steps, driven
//! by `run()` until quit or, in no-window mode, three consecutive idle
//! iterations.
//!
//! Grounded on `jhead-bevy-react`'s `js/engine.rs` `run_js_loop` for the
//! "flush jobs after every unit of work" discipline, restructured around a
//! single ordered `poll_once` instead of a command channel, per spec §5's
//! single-engine-thread model.
//!
//! `SchedulerState` (reactor, timers, event table, callback tables) is
//! split out from `Engine` (the `Context` itself) and shared as
//! `Rc<RefCell<SchedulerState>>` specifically so that native functions
//! registered into the engine — `setTimeout`, `fetch`, `addEventListener` —
//! can reach it from inside a JS call without re-borrowing the `Context`
//! they're already executing under.

pub mod timers;

use crate::engine::Engine;
use crate::events::EventListenerTable;
use crate::io::{watcher::ChangeKind, PendingCompletion, Reactor};
use boa_engine::object::builtins::{AlignedVec, JsArrayBuffer};
use boa_engine::{JsObject, JsResult, JsString, JsValue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use timers::TimerService;

/// A polled OS input event, produced by a window backend. No-window runs
/// never produce any.
#[derive(Debug, Clone)]
pub struct WindowInputEvent {
    pub target: crate::events::EventTarget,
    pub name: String,
    pub fields: Vec<(String, JsValue)>,
}

/// External collaborator: the actual windowing/input backend is outside
/// this crate's scope (spec Non-goals — "windowing and GPU presentation").
/// `poll_once` only needs *something* that can hand back events and report
/// whether a quit was requested at the OS level.
pub trait WindowSource {
    fn poll_events(&mut self) -> Vec<WindowInputEvent>;
    fn quit_requested(&self) -> bool {
        false
    }
}

/// A `WindowSource` that never produces events, for `--no-sdl` runs.
pub struct NoWindow;
impl WindowSource for NoWindow {
    fn poll_events(&mut self) -> Vec<WindowInputEvent> {
        Vec::new()
    }
}

/// Everything a native function registered into the engine might need to
/// reach: the reactor, the event table, the timer service, and the
/// engine-thread-only id -> callback tables. Shared as `Rc<RefCell<_>>`;
/// never held borrowed across a call back into the engine.
pub struct SchedulerState {
    pub reactor: Reactor,
    pub events: EventListenerTable,
    pub timers: TimerService,

    http_callbacks: HashMap<u64, JsValue>,
    file_callbacks: HashMap<u64, JsValue>,
    watch_callbacks: HashMap<u64, JsValue>,
    raf_next_id: u32,
    raf_entries: Vec<(u32, JsValue)>,
    raf_cancelled: std::collections::HashSet<u32>,

    /// The watch id backing `--watch`'s hot reload, if any. A completion for
    /// this id triggers `reload_requested` directly instead of invoking a
    /// JS callback, since reload isn't part of the scripted API surface.
    reload_watch_id: Option<u64>,

    reload_requested: bool,

    /// Set once the step-6 cache/timer/RAF clear has run for a fired
    /// reload watch; `runtime::Runtime::run` consumes it via
    /// `take_entry_reload` to know when to re-evaluate the entry module.
    /// `poll_once` only clears engine-thread state — it has no reference
    /// back to the loader's entry path, so re-running the script is the
    /// caller's job.
    entry_reload_ready: bool,

    quit: bool,
    frame_start: std::time::Instant,
}

impl SchedulerState {
    pub fn new(reactor: Reactor) -> Self {
        SchedulerState {
            reactor,
            events: EventListenerTable::new(),
            timers: TimerService::new(),
            http_callbacks: HashMap::new(),
            file_callbacks: HashMap::new(),
            watch_callbacks: HashMap::new(),
            raf_next_id: 0,
            raf_entries: Vec::new(),
            raf_cancelled: std::collections::HashSet::new(),
            reload_watch_id: None,
            reload_requested: false,
            entry_reload_ready: false,
            quit: false,
            frame_start: std::time::Instant::now(),
        }
    }

    pub fn elapsed_millis(&self) -> f64 {
        self.frame_start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn quit(&self) -> bool {
        self.quit
    }

    /// Consumes the "entry module needs re-evaluation" signal set by
    /// `Scheduler::poll_once`'s reload step.
    pub fn take_entry_reload(&mut self) -> bool {
        std::mem::take(&mut self.entry_reload_ready)
    }

    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    pub fn set_reload_watch_id(&mut self, watch_id: u64) {
        self.reload_watch_id = Some(watch_id);
    }

    pub fn request_raf(&mut self, callback: JsValue) -> u32 {
        self.raf_next_id += 1;
        let id = self.raf_next_id;
        self.raf_entries.push((id, callback));
        id
    }

    pub fn cancel_raf(&mut self, id: u32) {
        self.raf_cancelled.insert(id);
    }

    pub fn register_http_callback(&mut self, id: u64, callback: JsValue) {
        self.http_callbacks.insert(id, callback);
    }

    pub fn register_file_callback(&mut self, id: u64, callback: JsValue) {
        self.file_callbacks.insert(id, callback);
    }

    /// Replaces any previous callback for `watch_id`; a watch only ever has
    /// one live callback at a time.
    pub fn register_watch_callback(&mut self, watch_id: u64, callback: JsValue) {
        self.watch_callbacks.insert(watch_id, callback);
    }
}

pub struct Scheduler {
    pub engine: Engine,
    pub state: Rc<RefCell<SchedulerState>>,
    pub window: Box<dyn WindowSource>,
}

impl Scheduler {
    pub fn new(engine: Engine, reactor: Reactor, window: Box<dyn WindowSource>) -> Self {
        Scheduler { engine, state: Rc::new(RefCell::new(SchedulerState::new(reactor))), window }
    }

    fn invoke(&mut self, callback: &JsValue, args: &[JsValue]) {
        if let Some(callable) = callback.as_callable() {
            if let Err(e) = callable.call(&JsValue::undefined(), args, &mut self.engine.context) {
                log::error!("callback threw: {e}");
            }
        }
    }

    fn elapsed_millis(&self) -> f64 {
        self.state.borrow().elapsed_millis()
    }

    /// Runs every step of spec §4.5 exactly once. Returns `true` if any
    /// step did meaningful work, for the no-window idle-iteration count.
    pub fn poll_once(&mut self) -> bool {
        let mut did_work = false;

        // Step 1: window/input events.
        let window_events = self.window.poll_events();
        if self.window.quit_requested() {
            self.state.borrow_mut().request_quit();
        }
        for event in window_events {
            did_work = true;
            let event_object = build_event_object(&event, &mut self.engine.context);
            if let Ok(obj) = event_object {
                let dispatch_result = {
                    let state = self.state.borrow();
                    match event.target {
                        crate::events::EventTarget::Window => state.events.dispatch_to_window(&event.name, &obj, &mut self.engine.context),
                        _ => state.events.dispatch_input_event(&event.name, &obj, &mut self.engine.context),
                    }
                };
                if let Err(e) = dispatch_result {
                    log::error!("event dispatch failed: {e}");
                }
            }
        }

        // Step 2: one non-blocking reactor iteration (its worker threads run
        // continuously in the background; this just collects what they
        // produced since the last poll), split by completion kind.
        let (http_completions, file_completions, fs_completions) = {
            let state = self.state.borrow();
            let completions = state.reactor.drain();
            let mut http = Vec::new();
            let mut file = Vec::new();
            let mut fs = Vec::new();
            for completion in completions {
                match completion {
                    PendingCompletion::Http { id, result } => http.push((id, result)),
                    PendingCompletion::FileRead(completion) => file.push((completion.id, completion.result)),
                    PendingCompletion::FsEvent { watch_id, path, kind } => fs.push((watch_id, path, kind)),
                }
            }
            (http, file, fs)
        };

        // Step 3: HTTP completions.
        for (id, result) in http_completions {
            did_work = true;
            let callback = self.state.borrow_mut().http_callbacks.remove(&id);
            if let Some(callback) = callback {
                match http_response_object(&result, &mut self.engine.context) {
                    Ok(response) => self.invoke(&callback, &[response]),
                    Err(e) => log::error!("failed to build fetch response: {e}"),
                }
            }
        }

        // Step 4: file-read completions.
        for (id, result) in file_completions {
            did_work = true;
            let callback = self.state.borrow_mut().file_callbacks.remove(&id);
            if let Some(callback) = callback {
                match file_result_value(&result, &mut self.engine.context) {
                    Ok(value) => self.invoke(&callback, &[value]),
                    Err(e) => log::error!("failed to build file read result: {e}"),
                }
            }
        }

        // Step 5: filesystem-event completions.
        for (watch_id, path, kind) in fs_completions {
            did_work = true;
            let is_reload_watch = self.state.borrow().reload_watch_id == Some(watch_id);
            if is_reload_watch {
                self.state.borrow_mut().request_reload();
                continue;
            }
            let callback = self.state.borrow().watch_callbacks.get(&watch_id).cloned();
            if let Some(callback) = callback {
                let kind_str = match kind {
                    ChangeKind::Modified => "modified",
                    ChangeKind::Renamed => "renamed",
                    ChangeKind::Deleted => "deleted",
                };
                let path_val = JsValue::from(JsString::from(path.as_str()));
                let kind_val = JsValue::from(JsString::from(kind_str));
                self.invoke(&callback, &[path_val, kind_val]);
            }
        }

        // Step 6: reload.
        let reload_requested = {
            let mut state = self.state.borrow_mut();
            let requested = state.reload_requested;
            state.reload_requested = false;
            requested
        };
        if reload_requested {
            did_work = true;
            let mut state = self.state.borrow_mut();
            state.raf_entries.clear();
            state.raf_cancelled.clear();
            state.timers.clear_all();
            state.entry_reload_ready = true;
            drop(state);
            self.engine.loader.clear_caches();
            boa_gc::force_collect();
        }

        // Step 7: fired timers.
        let fired = self.state.borrow_mut().timers.drain_fired();
        if !fired.is_empty() {
            did_work = true;
        }
        let timestamp = JsValue::from(self.elapsed_millis());
        for (_id, callback) in fired {
            self.invoke(&callback, &[timestamp.clone()]);
        }

        // Step 8: worker-thread/domain-specific queues. None are wired up
        // yet (no worker-thread compute subsystem exists in this runtime);
        // left as the seam spec §4.5 describes for future producers.

        // Step 9: microtasks.
        self.engine.flush_microtasks();

        // Step 10 & 11: RAF batch inside a per-frame scope.
        let raf_batch = {
            let mut state = self.state.borrow_mut();
            let taken = std::mem::take(&mut state.raf_entries);
            let cancelled = std::mem::take(&mut state.raf_cancelled);
            taken.into_iter().filter(|(id, _)| !cancelled.contains(id)).collect::<Vec<_>>()
        };
        if !raf_batch.is_empty() {
            did_work = true;
            let timestamp = JsValue::from(self.elapsed_millis());
            for (_id, callback) in raf_batch {
                self.invoke(&callback, &[timestamp.clone()]);
            }
        }
        // Handle-scope teardown: `boa_engine`'s `Gc`-backed values need no
        // explicit scope-close call (see `loader::cache::ProtectedHandle`);
        // this step exists as a named seam for native allocations other
        // engine backends would require.

        did_work
    }

    /// Drives `poll_once()` until quit, or, in no-window mode, three
    /// consecutive idle iterations.
    pub fn run(&mut self, no_window: bool) {
        let mut idle_streak = 0;
        loop {
            if self.state.borrow().quit {
                break;
            }
            let did_work = self.poll_once();
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
        self.shutdown();
    }

    /// Spec §4.5 "Shutdown": stop every timer, cancel in-flight I/O, release
    /// every cached callback handle, run GC twice, release the engine.
    /// Public so `runtime::Runtime`, which drives `poll_once` itself to
    /// interleave hot-reload handling instead of calling `run`, can still
    /// invoke it when its own loop ends.
    pub fn shutdown(&mut self) {
        let mut state = self.state.borrow_mut();
        state.timers.clear_all();
        state.reactor.cancel_all();
        state.http_callbacks.clear();
        state.file_callbacks.clear();
        state.watch_callbacks.clear();
        state.raf_entries.clear();
        state.raf_cancelled.clear();
        drop(state);
        boa_gc::force_collect();
        boa_gc::force_collect();
    }
}

fn build_event_object(event: &WindowInputEvent, context: &mut boa_engine::Context) -> JsResult<JsValue> {
    let mut fields: Vec<(&str, JsValue)> = vec![("type", JsValue::from(JsString::from(event.name.as_str())))];
    for (key, value) in &event.fields {
        fields.push((key.as_str(), value.clone()));
    }
    crate::events::make_event_object(&fields, context)
}

fn http_response_object(outcome: &crate::io::http::HttpOutcome, context: &mut boa_engine::Context) -> JsResult<JsValue> {
    let object = JsObject::with_object_proto(context.intrinsics());
    object.set(JsString::from("ok"), JsValue::from(outcome.ok), true, context)?;
    object.set(JsString::from("status"), JsValue::from(outcome.status as i32), true, context)?;
    object.set(JsString::from("url"), JsValue::from(JsString::from(outcome.url.as_str())), true, context)?;
    let error_val = match &outcome.error {
        Some(msg) => JsValue::from(JsString::from(msg.as_str())),
        None => JsValue::null(),
    };
    object.set(JsString::from("error"), error_val, true, context)?;

    // spec §4.7: `data: ArrayBuffer|null` — the response body crosses into
    // JS as raw bytes, not a lossily-decoded string, so binary assets
    // (textures, meshes, audio) survive the trip intact.
    let data_value: JsValue = JsArrayBuffer::from_byte_block(AlignedVec::from_iter(0, outcome.data.iter().copied()), context)?.into();
    object.set(JsString::from("data"), data_value, true, context)?;

    let headers = JsObject::with_object_proto(context.intrinsics());
    for (key, value) in &outcome.headers {
        headers.set(JsString::from(key.as_str()), JsValue::from(JsString::from(value.as_str())), true, context)?;
    }
    object.set(JsString::from("headers"), headers, true, context)?;

    Ok(object.into())
}

fn file_result_value(result: &Result<Vec<u8>, String>, context: &mut boa_engine::Context) -> JsResult<JsValue> {
    let object = JsObject::with_object_proto(context.intrinsics());
    match result {
        Ok(bytes) => {
            let data_value: JsValue = JsArrayBuffer::from_byte_block(AlignedVec::from_iter(0, bytes.iter().copied()), context)?.into();
            object.set(JsString::from("ok"), JsValue::from(true), true, context)?;
            object.set(JsString::from("data"), data_value, true, context)?;
            object.set(JsString::from("error"), JsValue::null(), true, context)?;
        }
        Err(message) => {
            object.set(JsString::from("ok"), JsValue::from(false), true, context)?;
            object.set(JsString::from("data"), JsValue::null(), true, context)?;
            object.set(JsString::from("error"), JsValue::from(JsString::from(message.as_str())), true, context)?;
        }
    }
    Ok(object.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ModuleLoader;
    use crate::vfs::Vfs;
    use std::rc::Rc as StdRc;

    fn make_scheduler() -> Scheduler {
        let vfs = StdRc::new(Vfs::filesystem_only(std::env::temp_dir()));
        let loader = ModuleLoader::new(vfs);
        let engine = Engine::new(loader).unwrap();
        let reactor = Reactor::new().unwrap();
        Scheduler::new(engine, reactor, Box::new(NoWindow))
    }

    #[test]
    fn raf_callbacks_registered_mid_frame_run_next_frame() {
        let mut scheduler = make_scheduler();
        scheduler.engine.eval("globalThis.__count = 0;").unwrap();
        let cb = scheduler
            .engine
            .eval("(function() { globalThis.__count++; })")
            .unwrap();
        scheduler.state.borrow_mut().request_raf(cb);
        scheduler.poll_once();
        let count = scheduler.engine.eval("globalThis.__count").unwrap();
        assert_eq!(count.to_number(&mut scheduler.engine.context).unwrap(), 1.0);
    }

    #[test]
    fn cancelled_raf_callback_does_not_run() {
        let mut scheduler = make_scheduler();
        scheduler.engine.eval("globalThis.__count = 0;").unwrap();
        let cb = scheduler
            .engine
            .eval("(function() { globalThis.__count++; })")
            .unwrap();
        let id = scheduler.state.borrow_mut().request_raf(cb);
        scheduler.state.borrow_mut().cancel_raf(id);
        scheduler.poll_once();
        let count = scheduler.engine.eval("globalThis.__count").unwrap();
        assert_eq!(count.to_number(&mut scheduler.engine.context).unwrap(), 0.0);
    }

    #[test]
    fn idle_no_window_run_stops_after_three_quiet_iterations() {
        let mut scheduler = make_scheduler();
        scheduler.run(true);
        // Reaching here at all (rather than looping forever) is the assertion.
    }

    #[test]
    fn quit_request_stops_the_run_loop_immediately() {
        let mut scheduler = make_scheduler();
        scheduler.state.borrow_mut().request_quit();
        scheduler.run(false);
    }
}
