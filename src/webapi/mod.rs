//! Web API surface presented to scripts (spec §6): `fetch`, timers, RAF,
//! `document`/`window`/`canvas` event targets, `performance.now`,
//! `navigator.getGamepads`, plus the pure-JS shims (`TextEncoder`,
//! `TextDecoder`, `Worker`, `AudioContext` subset) that need no native
//! backing.
//!
//! Grounded on `jhead-bevy-react`'s `js/engine.rs` `register_environment_shims`
//! for the "native functions for anything touching Rust state, a JS string
//! for everything that's pure glue" split, and on `js/websocket/manager.rs`
//! for registering a native function bound to a shared, `Rc<RefCell<_>>`
//! piece of host state.

mod shims;

use crate::events::{make_event_object, resolve_target};
use crate::loader::ModuleLoader;
use crate::scheduler::SchedulerState;
use crate::vfs::Vfs;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source};
use boa_gc::{Finalize, Trace, empty_trace};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

type State = Rc<RefCell<SchedulerState>>;

/// Marks host-state captures (`Rc`/`Arc`-wrapped runtime state) as containing
/// no `boa_gc`-managed pointers, so they can be handed to
/// `NativeFunction::from_copy_closure_with_captures` without the GC tracing
/// that type otherwise demands.
struct NonGc<T>(T);

impl<T> Finalize for NonGc<T> {}
// SAFETY: `T` here is always plain Rust host state (`Rc`/`Arc`/tuples
// thereof), never a value containing `boa_gc`-managed pointers.
unsafe impl<T> Trace for NonGc<T> {
    empty_trace!();
}

/// Registers every native function and JS shim this runtime's scripts can
/// see. Called once, after `Engine::new`, with the same `SchedulerState`
/// `poll_once` drains from. `vfs` backs `readFile`'s background reads
/// (spec §4.7's `read_file(path, cb)` component) and is `Arc`-wrapped
/// because those reads run on the reactor's `tokio` blocking pool, separate
/// from the `Rc`-wrapped instance the module loader owns.
pub fn register(context: &mut Context, state: &State, loader: &Rc<ModuleLoader>, vfs: &Arc<Vfs>) -> JsResult<()> {
    register_timers(context, state)?;
    register_raf(context, state)?;
    register_fetch(context, state)?;
    register_read_file(context, state, vfs)?;
    register_performance(context, state)?;
    register_event_targets(context, state)?;
    register_worker(context, loader)?;

    context.eval(Source::from_bytes(shims::SOURCE.as_bytes()))?;
    Ok(())
}

fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or(JsValue::undefined())
}

fn register_global_fn<C, F>(context: &mut Context, name: &str, arity: usize, captures: C, f: F) -> JsResult<()>
where
    C: Clone + 'static,
    F: Fn(&JsValue, &[JsValue], &C, &mut Context) -> JsResult<JsValue> + Copy + 'static,
{
    let native = NativeFunction::from_copy_closure_with_captures(
        move |this: &JsValue, args: &[JsValue], captures: &NonGc<C>, ctx: &mut Context| f(this, args, &captures.0, ctx),
        NonGc(captures),
    );
    context
        .register_global_callable(JsString::from(name), arity, native)
        .map_err(|e| JsError::from_native(JsNativeError::error().with_message(format!("failed to register {name}: {e}"))))?;
    Ok(())
}

fn register_timers(context: &mut Context, state: &State) -> JsResult<()> {
    register_global_fn(context, "setTimeout", 2, state.clone(), |_this, args, state: &State, ctx| {
        let delay = arg(args, 1).to_number(ctx)?.max(0.0) as u64;
        let id = state.borrow_mut().timers.set_timeout(arg(args, 0), delay);
        Ok(JsValue::from(id))
    })?;

    register_global_fn(context, "setInterval", 2, state.clone(), |_this, args, state: &State, ctx| {
        let period = arg(args, 1).to_number(ctx)?.max(1.0) as u64;
        let id = state.borrow_mut().timers.set_interval(arg(args, 0), period);
        Ok(JsValue::from(id))
    })?;

    register_global_fn(context, "clearTimeout", 1, state.clone(), |_this, args, state: &State, ctx| {
        let id = arg(args, 0).to_number(ctx)? as u32;
        state.borrow_mut().timers.clear(id);
        Ok(JsValue::undefined())
    })?;

    register_global_fn(context, "clearInterval", 1, state.clone(), |_this, args, state: &State, ctx| {
        let id = arg(args, 0).to_number(ctx)? as u32;
        state.borrow_mut().timers.clear(id);
        Ok(JsValue::undefined())
    })?;

    Ok(())
}

fn register_raf(context: &mut Context, state: &State) -> JsResult<()> {
    register_global_fn(context, "requestAnimationFrame", 1, state.clone(), |_this, args, state: &State, _ctx| {
        let id = state.borrow_mut().request_raf(arg(args, 0));
        Ok(JsValue::from(id))
    })?;

    register_global_fn(context, "cancelAnimationFrame", 1, state.clone(), |_this, args, state: &State, ctx| {
        let id = arg(args, 0).to_number(ctx)? as u32;
        state.borrow_mut().cancel_raf(id);
        Ok(JsValue::undefined())
    })?;

    Ok(())
}

fn register_fetch(context: &mut Context, state: &State) -> JsResult<()> {
    register_global_fn(context, "__host_fetch", 2, state.clone(), |_this, args, state: &State, ctx| {
        let url = arg(args, 0).to_string(ctx)?.to_std_string_escaped();
        let callback = arg(args, 1);
        let mut state = state.borrow_mut();
        let id = state.reactor.spawn_http_get(url);
        state.register_http_callback(id, callback);
        Ok(JsValue::undefined())
    })?;
    Ok(())
}

/// Backing for `readFile` (spec §4.7): thread-pool reads with queued
/// completions, same shape as `fetch`'s callback wiring but against the VFS
/// instead of the network.
fn register_read_file(context: &mut Context, state: &State, vfs: &Arc<Vfs>) -> JsResult<()> {
    register_global_fn(context, "__host_read_file", 2, (state.clone(), Arc::clone(vfs)), |_this, args, (state, vfs): &(State, Arc<Vfs>), ctx| {
        let path = arg(args, 0).to_string(ctx)?.to_std_string_escaped();
        let callback = arg(args, 1);
        let mut state = state.borrow_mut();
        let id = state.reactor.spawn_file_read(Arc::clone(vfs), path);
        state.register_file_callback(id, callback);
        Ok(JsValue::undefined())
    })?;
    Ok(())
}

fn register_performance(context: &mut Context, state: &State) -> JsResult<()> {
    register_global_fn(context, "__host_performance_now", 0, state.clone(), |_this, _args, state: &State, _ctx| {
        Ok(JsValue::from(state.borrow().elapsed_millis()))
    })?;
    Ok(())
}

fn register_event_targets(context: &mut Context, state: &State) -> JsResult<()> {
    register_global_fn(
        context,
        "__host_add_event_listener",
        4,
        state.clone(),
        |_this, args, state: &State, ctx| {
            let target_name = arg(args, 0).to_string(ctx)?.to_std_string_escaped();
            let event_name = arg(args, 1).to_string(ctx)?.to_std_string_escaped();
            let callback = arg(args, 2);
            let capture = arg(args, 3).to_boolean();
            let target = resolve_target(&target_name)?;
            state.borrow_mut().events.add_listener(target, &event_name, callback, capture);
            Ok(JsValue::undefined())
        },
    )?;

    register_global_fn(
        context,
        "__host_remove_event_listener",
        4,
        state.clone(),
        |_this, args, state: &State, ctx| {
            let target_name = arg(args, 0).to_string(ctx)?.to_std_string_escaped();
            let event_name = arg(args, 1).to_string(ctx)?.to_std_string_escaped();
            let callback = arg(args, 2);
            let capture = arg(args, 3).to_boolean();
            let target = resolve_target(&target_name)?;
            state.borrow_mut().events.remove_listener(target, &event_name, &callback, capture);
            Ok(JsValue::undefined())
        },
    )?;

    register_global_fn(context, "__host_make_event", 1, (), |_this, args, _captures: &(), ctx| {
        let type_str = arg(args, 0).to_string(ctx)?.to_std_string_escaped();
        make_event_object(&[("type", JsValue::from(JsString::from(type_str.as_str())))], ctx)
    })?;

    Ok(())
}

/// Same-thread `Worker` polyfill backing (spec §6): evaluates the target
/// module immediately, in the caller's realm, under a scope that exposes
/// `postMessage`/`onmessage` via the JS-side shim in `shims::SOURCE`. There
/// is only one JS thread in this runtime, so true worker isolation isn't
/// achievable; message delivery still crosses a microtask boundary
/// (`Promise.resolve().then(...)` in the shim) to preserve the async
/// contract scripts expect.
fn register_worker(context: &mut Context, loader: &Rc<ModuleLoader>) -> JsResult<()> {
    register_global_fn(context, "__host_run_worker_script", 1, Rc::clone(loader), |_this, args, loader: &Rc<ModuleLoader>, ctx| {
        let specifier = arg(args, 0).to_string(ctx)?.to_std_string_escaped();
        loader
            .require(&specifier, "", ctx)
            .map_err(|_| JsError::from_native(JsNativeError::error().with_message(format!("worker script '{specifier}' failed to load"))))
    })?;
    Ok(())
}
